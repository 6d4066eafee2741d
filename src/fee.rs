//! Topup fee schedule
//!
//! Flat tiered fee, identical for HTG and USD (no conversion between them):
//!
//! | amount          | fee  |
//! |-----------------|------|
//! | `<= 0`          | 0.00 |
//! | `(0, 20]`       | 1.50 |
//! | `(20, 50]`      | 3.00 |
//! | `(50, 70]`      | 5.00 |
//! | `> 70`          | 7.50 |

use rust_decimal::Decimal;

use crate::money::round_money;

/// Tier upper bounds (inclusive) and the fee charged inside each tier,
/// in cents. Amounts above the last bound pay [`TOP_TIER_FEE_CENTS`].
const FEE_TIERS_CENTS: [(i64, i64); 3] = [(2_000, 150), (5_000, 300), (7_000, 500)];

const TOP_TIER_FEE_CENTS: i64 = 750;

#[inline]
fn cents(value: i64) -> Decimal {
    Decimal::new(value, 2)
}

/// Fee charged for a topup of `amount`.
///
/// # Example
/// ```
/// use rust_decimal::Decimal;
/// use wallet_ledger::fee::fee;
/// assert_eq!(fee(Decimal::new(100, 0)), Decimal::new(750, 2));
/// ```
pub fn fee(amount: Decimal) -> Decimal {
    if amount <= Decimal::ZERO {
        return cents(0);
    }
    FEE_TIERS_CENTS
        .iter()
        .find(|(bound, _)| amount <= cents(*bound))
        .map(|(_, fee)| cents(*fee))
        .unwrap_or_else(|| cents(TOP_TIER_FEE_CENTS))
}

/// Amount credited to the wallet: `max(amount - fee(amount), 0)`.
pub fn net(amount: Decimal) -> Decimal {
    let n = round_money(amount - fee(amount));
    if n > Decimal::ZERO { n } else { cents(0) }
}

/// Manual topups must clear the first fee tier: anything at or below
/// 20 is fee-dominated and refused at creation.
pub const MIN_TOPUP_EXCLUSIVE_CENTS: i64 = FEE_TIERS_CENTS[0].0;

/// A topup request is only accepted when it nets to something positive
/// and exceeds [`MIN_TOPUP_EXCLUSIVE_CENTS`].
#[inline]
pub fn is_payable(amount: Decimal) -> bool {
    amount > fee(amount) && amount > cents(MIN_TOPUP_EXCLUSIVE_CENTS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_fee_tier_boundaries() {
        assert_eq!(fee(d("20")), d("1.50"));
        assert_eq!(fee(d("20.01")), d("3.00"));
        assert_eq!(fee(d("50")), d("3.00"));
        assert_eq!(fee(d("50.01")), d("5.00"));
        assert_eq!(fee(d("70")), d("5.00"));
        assert_eq!(fee(d("70.01")), d("7.50"));
        assert_eq!(fee(d("100000")), d("7.50"));
    }

    #[test]
    fn test_fee_non_positive() {
        assert_eq!(fee(Decimal::ZERO), Decimal::ZERO);
        assert_eq!(fee(d("-10")), Decimal::ZERO);
        assert_eq!(fee(d("0.01")), d("1.50"));
    }

    #[test]
    fn test_net() {
        assert_eq!(net(d("100")), d("92.50"));
        assert_eq!(net(d("21")), d("18.00"));
        // Floored at zero
        assert_eq!(net(d("1")), Decimal::ZERO);
        assert_eq!(net(d("1.50")), Decimal::ZERO);
    }

    #[test]
    fn test_is_payable() {
        assert!(!is_payable(d("20")));
        assert!(!is_payable(d("1.50")));
        assert!(!is_payable(d("1.51")));
        assert!(is_payable(d("20.01")));
        assert!(is_payable(d("250")));
    }
}
