//! Ledger entries
//!
//! Every balance change is one immutable [`LedgerEntry`]. Amounts are stored
//! as unsigned magnitudes; the [`Direction`] tag alone decides how an entry
//! moves the wallet. Conversion entries move two balances: they debit
//! `amount` in `currency` and credit `counter_amount` in the other currency.
//!
//! Reconciliation invariant: replaying a user's entries through
//! [`reconcile`] yields exactly the wallet's current balances.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core_types::{Currency, EntryId, UserId};
use crate::error::LedgerError;
use crate::fx::ConversionDirection;
use crate::money::{require_positive, round_money};

/// Default page size for transaction listings
pub const DEFAULT_LIST_LIMIT: usize = 200;

/// Business category of a ledger entry (`type` column)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Topup,
    Transfer,
    Convert,
    Fee,
    PartnerSpend,
    AdminAdjust,
    ReferralBonus,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Topup => "topup",
            EntryType::Transfer => "transfer",
            EntryType::Convert => "convert",
            EntryType::Fee => "fee",
            EntryType::PartnerSpend => "partner_spend",
            EntryType::AdminAdjust => "admin_adjust",
            EntryType::ReferralBonus => "referral_bonus",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "topup" => Ok(EntryType::Topup),
            "transfer" => Ok(EntryType::Transfer),
            "convert" => Ok(EntryType::Convert),
            "fee" => Ok(EntryType::Fee),
            "partner_spend" => Ok(EntryType::PartnerSpend),
            "admin_adjust" => Ok(EntryType::AdminAdjust),
            "referral_bonus" => Ok(EntryType::ReferralBonus),
            _ => Err(format!("Invalid entry type: {}", s)),
        }
    }
}

/// Semantic direction of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Credit,
    Debit,
    HtgToUsd,
    UsdToHtg,
    TransferIn,
    TransferOut,
    ManualTopup,
    /// Audit record only, never moves a balance
    Fee,
    ReferralBonus,
    AdminCredit,
    AdminDebit,
    PartnerSpend,
}

/// How a direction moves the entry's own currency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Increase,
    Decrease,
    /// Decrease `currency`, increase the counter currency
    Exchange,
    None,
}

impl Direction {
    pub fn effect(&self) -> Effect {
        match self {
            Direction::Credit
            | Direction::TransferIn
            | Direction::ManualTopup
            | Direction::ReferralBonus
            | Direction::AdminCredit => Effect::Increase,
            Direction::Debit
            | Direction::TransferOut
            | Direction::AdminDebit
            | Direction::PartnerSpend => Effect::Decrease,
            Direction::HtgToUsd | Direction::UsdToHtg => Effect::Exchange,
            Direction::Fee => Effect::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Credit => "credit",
            Direction::Debit => "debit",
            Direction::HtgToUsd => "htg_to_usd",
            Direction::UsdToHtg => "usd_to_htg",
            Direction::TransferIn => "transfer_in",
            Direction::TransferOut => "transfer_out",
            Direction::ManualTopup => "manual_topup",
            Direction::Fee => "fee",
            Direction::ReferralBonus => "referral_bonus",
            Direction::AdminCredit => "admin_credit",
            Direction::AdminDebit => "admin_debit",
            Direction::PartnerSpend => "partner_spend",
        }
    }
}

impl From<ConversionDirection> for Direction {
    fn from(d: ConversionDirection) -> Self {
        match d {
            ConversionDirection::HtgToUsd => Direction::HtgToUsd,
            ConversionDirection::UsdToHtg => Direction::UsdToHtg,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit" => Ok(Direction::Credit),
            "debit" => Ok(Direction::Debit),
            "htg_to_usd" => Ok(Direction::HtgToUsd),
            "usd_to_htg" => Ok(Direction::UsdToHtg),
            "transfer_in" => Ok(Direction::TransferIn),
            "transfer_out" => Ok(Direction::TransferOut),
            "manual_topup" => Ok(Direction::ManualTopup),
            "fee" => Ok(Direction::Fee),
            "referral_bonus" => Ok(Direction::ReferralBonus),
            "admin_credit" => Ok(Direction::AdminCredit),
            "admin_debit" => Ok(Direction::AdminDebit),
            "partner_spend" => Ok(Direction::PartnerSpend),
            _ => Err(format!("Invalid direction: {}", s)),
        }
    }
}

/// Signed balance deltas produced by one entry, at most one per currency.
fn signed_deltas(
    direction: Direction,
    currency: Currency,
    amount: Decimal,
    counter_amount: Option<Decimal>,
) -> Vec<(Currency, Decimal)> {
    match direction.effect() {
        Effect::Increase => vec![(currency, amount)],
        Effect::Decrease => vec![(currency, -amount)],
        Effect::Exchange => vec![
            (currency, -amount),
            (currency.counter(), counter_amount.unwrap_or_default()),
        ],
        Effect::None => Vec::new(),
    }
}

/// A balance-changing event waiting to be applied.
///
/// `UnitOfWork::post` is the only way to change a wallet, and it always
/// takes a `Posting`: the balance mutation and its ledger entry cannot be
/// separated.
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub user_id: UserId,
    pub entry_type: EntryType,
    pub direction: Direction,
    pub currency: Currency,
    pub amount: Decimal,
    pub counter_amount: Option<Decimal>,
    pub rate_used: Option<Decimal>,
    pub note: String,
}

impl Posting {
    fn build(
        user_id: UserId,
        entry_type: EntryType,
        direction: Direction,
        currency: Currency,
        amount: Decimal,
        note: impl Into<String>,
    ) -> Result<Self, LedgerError> {
        Ok(Self {
            user_id,
            entry_type,
            direction,
            currency,
            amount: require_positive(amount)?,
            counter_amount: None,
            rate_used: None,
            note: note.into(),
        })
    }

    /// Balance-increasing posting. `direction` must increase the wallet.
    pub fn credit(
        user_id: UserId,
        entry_type: EntryType,
        direction: Direction,
        currency: Currency,
        amount: Decimal,
        note: impl Into<String>,
    ) -> Result<Self, LedgerError> {
        if direction.effect() != Effect::Increase {
            return Err(LedgerError::Internal(format!(
                "{} is not a credit direction",
                direction
            )));
        }
        Self::build(user_id, entry_type, direction, currency, amount, note)
    }

    /// Balance-decreasing posting. `direction` must decrease the wallet.
    pub fn debit(
        user_id: UserId,
        entry_type: EntryType,
        direction: Direction,
        currency: Currency,
        amount: Decimal,
        note: impl Into<String>,
    ) -> Result<Self, LedgerError> {
        if direction.effect() != Effect::Decrease {
            return Err(LedgerError::Internal(format!(
                "{} is not a debit direction",
                direction
            )));
        }
        Self::build(user_id, entry_type, direction, currency, amount, note)
    }

    /// Fee audit record: appended to the ledger, moves no balance.
    pub fn fee_audit(
        user_id: UserId,
        currency: Currency,
        fee: Decimal,
        note: impl Into<String>,
    ) -> Result<Self, LedgerError> {
        Self::build(user_id, EntryType::Fee, Direction::Fee, currency, fee, note)
    }

    /// In-wallet conversion: debit `amount_in`, credit `amount_out` of the other currency.
    pub fn conversion(
        user_id: UserId,
        direction: ConversionDirection,
        amount_in: Decimal,
        amount_out: Decimal,
        rate: Decimal,
    ) -> Result<Self, LedgerError> {
        let mut posting = Self::build(
            user_id,
            EntryType::Convert,
            direction.into(),
            direction.from_currency(),
            amount_in,
            format!(
                "{}->{}",
                direction.from_currency().as_str().to_uppercase(),
                direction.to_currency().as_str().to_uppercase()
            ),
        )?;
        posting.counter_amount = Some(require_positive(amount_out)?);
        posting.rate_used = Some(rate);
        Ok(posting)
    }

    /// Signed balance deltas this posting applies
    pub fn deltas(&self) -> Vec<(Currency, Decimal)> {
        signed_deltas(self.direction, self.currency, self.amount, self.counter_amount)
    }

    /// Net signed delta on one currency
    pub fn delta_for(&self, currency: Currency) -> Decimal {
        self.deltas()
            .into_iter()
            .filter(|(c, _)| *c == currency)
            .map(|(_, v)| v)
            .sum()
    }

    /// Materialise the immutable entry once the store has assigned an id.
    pub fn into_entry(self, id: EntryId, created_at: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry {
            id,
            user_id: self.user_id,
            entry_type: self.entry_type,
            currency: self.currency,
            amount: self.amount,
            direction: self.direction,
            counter_amount: self.counter_amount,
            rate_used: self.rate_used,
            note: self.note,
            created_at,
        }
    }
}

/// Immutable ledger entry (`transactions` row)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub user_id: UserId,
    pub entry_type: EntryType,
    pub currency: Currency,
    pub amount: Decimal,
    pub direction: Direction,
    /// Credited amount of the counter currency (conversions only)
    pub counter_amount: Option<Decimal>,
    /// FX rate applied (conversions only)
    pub rate_used: Option<Decimal>,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn deltas(&self) -> Vec<(Currency, Decimal)> {
        signed_deltas(self.direction, self.currency, self.amount, self.counter_amount)
    }

    /// Whether this entry moves or records `currency`
    pub fn touches(&self, currency: Currency) -> bool {
        self.currency == currency
            || (self.direction.effect() == Effect::Exchange && self.currency.counter() == currency)
    }
}

/// Transaction listing filter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxFilter {
    pub entry_type: Option<EntryType>,
    pub currency: Option<Currency>,
    pub direction: Option<Direction>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl TxFilter {
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.entry_type.is_none_or(|t| entry.entry_type == t)
            && self.currency.is_none_or(|c| entry.touches(c))
            && self.direction.is_none_or(|d| entry.direction == d)
            && self.since.is_none_or(|s| entry.created_at >= s)
            && self.until.is_none_or(|u| entry.created_at < u)
    }

    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT)
    }
}

/// Per-currency balance pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    pub htg: Decimal,
    pub usd: Decimal,
}

impl Balances {
    pub fn get(&self, currency: Currency) -> Decimal {
        match currency {
            Currency::Htg => self.htg,
            Currency::Usd => self.usd,
        }
    }

    pub fn add(&mut self, currency: Currency, delta: Decimal) {
        let slot = match currency {
            Currency::Htg => &mut self.htg,
            Currency::Usd => &mut self.usd,
        };
        *slot = round_money(*slot + delta);
    }
}

/// Audit line for entries whose unit has committed.
pub fn log_committed(entries: &[&LedgerEntry]) {
    for e in entries {
        tracing::info!(
            target: crate::logging::AUDIT_TARGET,
            entry_id = e.id,
            user_id = e.user_id,
            entry_type = %e.entry_type,
            direction = %e.direction,
            currency = %e.currency,
            amount = %e.amount,
            counter_amount = ?e.counter_amount,
            "ledger entry committed"
        );
    }
}

/// Replay entries into the balances they imply.
pub fn reconcile<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Balances {
    let mut balances = Balances::default();
    for entry in entries {
        for (currency, delta) in entry.deltas() {
            balances.add(currency, delta);
        }
    }
    balances
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn entry(posting: Posting) -> LedgerEntry {
        posting.into_entry(1, Utc::now())
    }

    #[test]
    fn test_credit_debit_direction_guard() {
        let htg = Currency::Htg;
        let out = Direction::TransferOut;
        let into = Direction::TransferIn;
        assert!(Posting::credit(1, EntryType::Transfer, out, htg, d("1"), "").is_err());
        assert!(Posting::debit(1, EntryType::Transfer, into, htg, d("1"), "").is_err());
        assert!(matches!(
            Posting::credit(1, EntryType::Topup, Direction::ManualTopup, htg, d("0"), ""),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_conversion_deltas() {
        let p = Posting::conversion(1, ConversionDirection::HtgToUsd, d("134"), d("1"), d("134"))
            .unwrap();
        assert_eq!(p.delta_for(Currency::Htg), d("-134"));
        assert_eq!(p.delta_for(Currency::Usd), d("1"));
        assert_eq!(p.rate_used, Some(d("134")));
        assert_eq!(p.note, "HTG->USD");
    }

    #[test]
    fn test_fee_audit_moves_nothing() {
        let p = Posting::fee_audit(1, Currency::Usd, d("7.50"), "fee").unwrap();
        assert!(p.deltas().is_empty());
        assert_eq!(p.delta_for(Currency::Usd), Decimal::ZERO);
    }

    #[test]
    fn test_reconcile() {
        let postings = [
            Posting::credit(
                1,
                EntryType::Topup,
                Direction::ManualTopup,
                Currency::Htg,
                d("500"),
                "",
            ),
            Posting::fee_audit(1, Currency::Htg, d("7.50"), ""),
            Posting::debit(
                1,
                EntryType::Transfer,
                Direction::TransferOut,
                Currency::Htg,
                d("100"),
                "",
            ),
            Posting::conversion(1, ConversionDirection::HtgToUsd, d("134"), d("1"), d("134")),
            Posting::debit(
                1,
                EntryType::PartnerSpend,
                Direction::PartnerSpend,
                Currency::Usd,
                d("0.25"),
                "",
            ),
        ];
        let entries: Vec<_> = postings.into_iter().map(|p| entry(p.unwrap())).collect();
        let b = reconcile(&entries);
        assert_eq!(b.htg, d("266"));
        assert_eq!(b.usd, d("0.75"));
    }

    #[test]
    fn test_filter() {
        let usd_to_htg = ConversionDirection::UsdToHtg;
        let conv = entry(Posting::conversion(1, usd_to_htg, d("1"), d("126"), d("126")).unwrap());
        let f = TxFilter {
            currency: Some(Currency::Htg),
            ..Default::default()
        };
        assert!(f.matches(&conv));

        let f = TxFilter {
            entry_type: Some(EntryType::Fee),
            ..Default::default()
        };
        assert!(!f.matches(&conv));
        assert_eq!(f.effective_limit(), DEFAULT_LIST_LIMIT);
    }

    #[test]
    fn test_direction_round_trip_strings() {
        for dir in [Direction::HtgToUsd, Direction::ManualTopup, Direction::AdminDebit] {
            assert_eq!(dir.as_str().parse::<Direction>().unwrap(), dir);
        }
        assert!("spend".parse::<Direction>().is_err());
    }
}
