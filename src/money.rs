//! Money Module
//!
//! All wallet amounts are `rust_decimal::Decimal` with two decimal places.
//! Every arithmetic result that lands in a balance, a fee or a ledger entry
//! goes through [`round_money`] (half-up, 2 dp) first.
//!
//! ## Design Principles
//! 1. No binary floating point anywhere on the money path
//! 2. Explicit Error Handling: input with more than 2 decimals is rejected, not truncated
//! 3. One rounding rule, applied at every arithmetic boundary

use rust_decimal::prelude::*;

use crate::error::LedgerError;

/// Decimal places carried by every balance and ledger amount
pub const MONEY_DP: u32 = 2;

/// Largest amount or balance the ledger stores: 999 999 999 999 999 999.99,
/// the ceiling of a `NUMERIC(20, 2)` column.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_661_992_959, 1_808_227_885, 5, false, 2);

/// Round to 2 decimal places, midpoint away from zero (half-up for positives)
#[inline]
pub fn round_money(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_DP);
    rounded
}

/// Validate an amount that must be strictly positive with at most 2 decimals.
pub fn require_positive(amount: Decimal) -> Result<Decimal, LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(format!(
            "{} must be greater than zero",
            amount
        )));
    }
    check_precision(amount)?;
    check_range(amount)?;
    Ok(round_money(amount))
}

/// Validate a signed amount that must not be zero (admin adjustments).
pub fn require_nonzero(amount: Decimal) -> Result<Decimal, LedgerError> {
    if amount.is_zero() {
        return Err(LedgerError::InvalidAmount("amount must not be zero".into()));
    }
    check_precision(amount)?;
    check_range(amount)?;
    Ok(round_money(amount))
}

/// Reject magnitudes above [`MAX_AMOUNT`].
pub fn check_range(amount: Decimal) -> Result<(), LedgerError> {
    if amount.abs() > MAX_AMOUNT {
        return Err(LedgerError::InvalidAmount(format!(
            "{} exceeds the maximum amount {}",
            amount, MAX_AMOUNT
        )));
    }
    Ok(())
}

fn check_precision(amount: Decimal) -> Result<(), LedgerError> {
    if amount.normalize().scale() > MONEY_DP {
        return Err(LedgerError::InvalidAmount(format!(
            "{} has more than {} decimal places",
            amount, MONEY_DP
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_round_money_half_up() {
        assert_eq!(round_money(d("0.745")), d("0.75"));
        assert_eq!(round_money(d("0.744")), d("0.74"));
        assert_eq!(round_money(d("1")), d("1.00"));
        assert_eq!(round_money(d("1")).scale(), 2);
        assert_eq!(round_money(d("-2.345")), d("-2.35"));
    }

    #[test]
    fn test_require_positive_and_nonzero() {
        assert!(require_positive(d("-1")).is_err());
        assert!(require_positive(Decimal::ZERO).is_err());
        assert!(require_positive(d("1.001")).is_err());
        // Trailing zeros beyond 2 dp are not extra precision
        assert_eq!(require_positive(d("1.500")).unwrap(), d("1.50"));

        assert_eq!(require_nonzero(d("-25")).unwrap(), d("-25.00"));
        assert!(require_nonzero(Decimal::ZERO).is_err());
    }

    #[test]
    fn test_amount_ceiling() {
        assert_eq!(MAX_AMOUNT, d("999999999999999999.99"));
        assert_eq!(require_positive(MAX_AMOUNT).unwrap(), MAX_AMOUNT);
        assert_eq!(require_nonzero(-MAX_AMOUNT).unwrap(), -MAX_AMOUNT);

        let over = MAX_AMOUNT + d("0.01");
        assert!(matches!(require_positive(over), Err(LedgerError::InvalidAmount(_))));
        assert!(matches!(require_nonzero(-over), Err(LedgerError::InvalidAmount(_))));
        assert!(matches!(
            require_positive(Decimal::MAX),
            Err(LedgerError::InvalidAmount(_))
        ));
    }
}
