//! Ledger store
//!
//! Persistence boundary for users, wallets, ledger entries, topup requests,
//! partners and the FX singleton. Two backends:
//!
//! - [`postgres::PgLedgerStore`] - authoritative store, row locks + CAS updates
//! - [`memory::MemoryStore`] - single-process store, one unit of work at a time
//!
//! All mutations happen inside a [`UnitOfWork`]. Nothing a unit does is
//! visible to anyone else until [`UnitOfWork::commit`]; dropping an
//! uncommitted unit rolls everything back.

pub mod memory;
pub mod postgres;
pub mod schema;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::account::{NewUser, UserRecord};
use crate::core_types::{Currency, PartnerId, TopupId, UserId};
use crate::error::LedgerError;
use crate::fx::FxSetting;
use crate::ledger::{Balances, EntryType, LedgerEntry, Posting, TxFilter};
use crate::partner::{NewPartner, Partner};
use crate::topup::{DecisionRecord, NewTopupRequest, TopupRequest, TopupStatus};
use crate::wallet::Wallet;

pub use memory::MemoryStore;
pub use postgres::PgLedgerStore;

/// Read side plus the unit-of-work factory.
///
/// Reads outside a unit see committed state only and take no locks.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Open an atomic unit of work
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, LedgerError>;

    async fn get_user(&self, user_id: UserId) -> Result<Option<UserRecord>, LedgerError>;

    async fn get_wallet(&self, user_id: UserId) -> Result<Option<Wallet>, LedgerError>;

    /// All wallet owners, ascending
    async fn wallet_user_ids(&self) -> Result<Vec<UserId>, LedgerError>;

    /// Newest first, `filter` applied, capped at `filter.effective_limit()`
    async fn list_entries(
        &self,
        user_id: UserId,
        filter: &TxFilter,
    ) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Every entry of a user, oldest first (reconciliation)
    async fn all_entries(&self, user_id: UserId) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Sum of entry magnitudes of one type, per currency, created at or after `since`
    async fn sum_entries(
        &self,
        entry_type: EntryType,
        since: Option<DateTime<Utc>>,
    ) -> Result<Balances, LedgerError>;

    async fn get_topup(&self, id: TopupId) -> Result<Option<TopupRequest>, LedgerError>;

    /// A user's requests, newest first
    async fn list_topups_by_user(&self, user_id: UserId)
    -> Result<Vec<TopupRequest>, LedgerError>;

    /// Requests in `status`, oldest first
    async fn list_topups_by_status(
        &self,
        status: TopupStatus,
    ) -> Result<Vec<TopupRequest>, LedgerError>;

    async fn get_partner(&self, id: PartnerId) -> Result<Option<Partner>, LedgerError>;

    /// Newest first
    async fn list_partners(&self, active_only: bool) -> Result<Vec<Partner>, LedgerError>;
}

/// One atomic, isolated unit of work.
#[async_trait]
pub trait UnitOfWork: Send {
    // === Users ===

    async fn get_user(&mut self, user_id: UserId) -> Result<Option<UserRecord>, LedgerError>;

    /// Read a user and hold it against concurrent writers until the unit ends
    async fn lock_user(&mut self, user_id: UserId) -> Result<Option<UserRecord>, LedgerError>;

    async fn find_user_by_email(&mut self, email: &str)
    -> Result<Option<UserRecord>, LedgerError>;

    /// Insert a user together with its zero wallet
    async fn insert_user(&mut self, new: &NewUser) -> Result<UserRecord, LedgerError>;

    /// Whether the user owns any ledger entry or topup request
    async fn has_history(&mut self, user_id: UserId) -> Result<bool, LedgerError>;

    /// Delete a user and its wallet; referred users keep existing with the
    /// back-reference cleared
    async fn delete_user(&mut self, user_id: UserId) -> Result<(), LedgerError>;

    /// Flip `referral_bonus_paid` false -> true. Returns false if it was already set.
    async fn mark_referral_bonus_paid_if_unpaid(
        &mut self,
        user_id: UserId,
    ) -> Result<bool, LedgerError>;

    /// Distinct users referred by `referrer_id` holding at least one approved
    /// topup in `currency` with `amount >= min_amount`
    async fn count_qualified_referrals(
        &mut self,
        referrer_id: UserId,
        currency: Currency,
        min_amount: rust_decimal::Decimal,
    ) -> Result<u64, LedgerError>;

    // === Wallets & ledger ===

    /// Read a wallet and hold it against concurrent writers until the unit ends
    async fn lock_wallet(&mut self, user_id: UserId) -> Result<Wallet, LedgerError>;

    /// Apply a posting's balance effect and append its ledger entry, as one step.
    ///
    /// Fails with `InsufficientBalance` (nothing applied) if any balance would
    /// go negative, and with `WalletNotFound` if the user has no wallet.
    async fn post(&mut self, posting: Posting) -> Result<LedgerEntry, LedgerError>;

    // === Topups ===

    async fn insert_topup(&mut self, new: NewTopupRequest) -> Result<TopupRequest, LedgerError>;

    async fn get_topup(&mut self, id: TopupId) -> Result<Option<TopupRequest>, LedgerError>;

    /// Compare-and-swap PENDING -> decision. `None` if the request was no
    /// longer pending (or does not exist).
    async fn decide_topup_if_pending(
        &mut self,
        id: TopupId,
        decision: &DecisionRecord,
    ) -> Result<Option<TopupRequest>, LedgerError>;

    // === FX ===

    /// Current rates, creating the default row if absent
    async fn get_fx(&mut self) -> Result<FxSetting, LedgerError>;

    async fn set_fx(&mut self, fx: &FxSetting) -> Result<(), LedgerError>;

    // === Partners ===

    async fn insert_partner(&mut self, new: &NewPartner) -> Result<Partner, LedgerError>;

    async fn get_partner(&mut self, id: PartnerId) -> Result<Option<Partner>, LedgerError>;

    /// Returns the updated partner, `None` if it does not exist
    async fn set_partner_active(
        &mut self,
        id: PartnerId,
        active: bool,
    ) -> Result<Option<Partner>, LedgerError>;

    // === Lifecycle ===

    /// Make everything done in this unit durable and visible
    async fn commit(&mut self) -> Result<(), LedgerError>;
}

fn finished_unit() -> LedgerError {
    LedgerError::Internal("unit of work already committed".into())
}
