//! In-memory ledger store
//!
//! A unit of work holds the store mutex for its whole lifetime and mutates a
//! private copy of the state; commit swaps the copy in. Units are therefore
//! fully serialised, and an uncommitted unit leaves no trace.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{LedgerStore, UnitOfWork, finished_unit};
use crate::account::{NewUser, UserRecord, normalize_email};
use crate::core_types::{Currency, EntryId, PartnerId, TopupId, UserId};
use crate::error::LedgerError;
use crate::fx::FxSetting;
use crate::ledger::{Balances, EntryType, LedgerEntry, Posting, TxFilter};
use crate::money::{check_range, round_money};
use crate::partner::{NewPartner, Partner};
use crate::topup::{DecisionRecord, NewTopupRequest, TopupRequest, TopupStatus};
use crate::wallet::Wallet;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: BTreeMap<UserId, UserRecord>,
    wallets: BTreeMap<UserId, Wallet>,
    entries: Vec<LedgerEntry>,
    topups: BTreeMap<TopupId, TopupRequest>,
    partners: BTreeMap<PartnerId, Partner>,
    fx: Option<FxSetting>,
    next_user_id: UserId,
    next_entry_id: EntryId,
    next_topup_id: TopupId,
    next_partner_id: PartnerId,
}

impl MemoryState {
    fn next_id(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }
}

/// In-memory ledger store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, LedgerError> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryUnit {
            guard: Some(guard),
            work,
        }))
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<UserRecord>, LedgerError> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn get_wallet(&self, user_id: UserId) -> Result<Option<Wallet>, LedgerError> {
        Ok(self.state.lock().await.wallets.get(&user_id).cloned())
    }

    async fn wallet_user_ids(&self) -> Result<Vec<UserId>, LedgerError> {
        Ok(self.state.lock().await.wallets.keys().copied().collect())
    }

    async fn list_entries(
        &self,
        user_id: UserId,
        filter: &TxFilter,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state
            .entries
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id && filter.matches(e))
            .take(filter.effective_limit())
            .cloned()
            .collect())
    }

    async fn all_entries(&self, user_id: UserId) -> Result<Vec<LedgerEntry>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state
            .entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn sum_entries(
        &self,
        entry_type: EntryType,
        since: Option<DateTime<Utc>>,
    ) -> Result<Balances, LedgerError> {
        let state = self.state.lock().await;
        let mut totals = Balances::default();
        for e in state
            .entries
            .iter()
            .filter(|e| e.entry_type == entry_type && since.is_none_or(|s| e.created_at >= s))
        {
            totals.add(e.currency, e.amount);
        }
        Ok(totals)
    }

    async fn get_topup(&self, id: TopupId) -> Result<Option<TopupRequest>, LedgerError> {
        Ok(self.state.lock().await.topups.get(&id).cloned())
    }

    async fn list_topups_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<TopupRequest>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state
            .topups
            .values()
            .rev()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_topups_by_status(
        &self,
        status: TopupStatus,
    ) -> Result<Vec<TopupRequest>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state
            .topups
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect())
    }

    async fn get_partner(&self, id: PartnerId) -> Result<Option<Partner>, LedgerError> {
        Ok(self.state.lock().await.partners.get(&id).cloned())
    }

    async fn list_partners(&self, active_only: bool) -> Result<Vec<Partner>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state
            .partners
            .values()
            .rev()
            .filter(|p| !active_only || p.active)
            .cloned()
            .collect())
    }
}

struct MemoryUnit {
    guard: Option<OwnedMutexGuard<MemoryState>>,
    work: MemoryState,
}

impl MemoryUnit {
    fn state(&mut self) -> Result<&mut MemoryState, LedgerError> {
        if self.guard.is_none() {
            return Err(finished_unit());
        }
        Ok(&mut self.work)
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnit {
    async fn get_user(&mut self, user_id: UserId) -> Result<Option<UserRecord>, LedgerError> {
        Ok(self.state()?.users.get(&user_id).cloned())
    }

    async fn lock_user(&mut self, user_id: UserId) -> Result<Option<UserRecord>, LedgerError> {
        // The unit already holds the store exclusively.
        self.get_user(user_id).await
    }

    async fn find_user_by_email(
        &mut self,
        email: &str,
    ) -> Result<Option<UserRecord>, LedgerError> {
        let email = normalize_email(email);
        Ok(self
            .state()?
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn insert_user(&mut self, new: &NewUser) -> Result<UserRecord, LedgerError> {
        let state = self.state()?;
        let email = normalize_email(&new.email);
        if state.users.values().any(|u| u.email == email) {
            return Err(LedgerError::DuplicateUser(email));
        }
        if let Some(referrer) = new.referred_by_user_id {
            if !state.users.contains_key(&referrer) {
                return Err(LedgerError::UserNotFound(referrer));
            }
        }
        let user_id = MemoryState::next_id(&mut state.next_user_id);
        let record = UserRecord {
            user_id,
            email,
            role: new.role,
            status: Default::default(),
            referred_by_user_id: new.referred_by_user_id,
            referral_bonus_paid: false,
            created_at: Utc::now(),
        };
        state.users.insert(user_id, record.clone());
        state.wallets.insert(user_id, Wallet::empty(user_id));
        Ok(record)
    }

    async fn has_history(&mut self, user_id: UserId) -> Result<bool, LedgerError> {
        let state = self.state()?;
        Ok(state.entries.iter().any(|e| e.user_id == user_id)
            || state.topups.values().any(|t| t.user_id == user_id))
    }

    async fn delete_user(&mut self, user_id: UserId) -> Result<(), LedgerError> {
        let state = self.state()?;
        if state.users.remove(&user_id).is_none() {
            return Err(LedgerError::UserNotFound(user_id));
        }
        state.wallets.remove(&user_id);
        for user in state.users.values_mut() {
            if user.referred_by_user_id == Some(user_id) {
                user.referred_by_user_id = None;
            }
        }
        Ok(())
    }

    async fn mark_referral_bonus_paid_if_unpaid(
        &mut self,
        user_id: UserId,
    ) -> Result<bool, LedgerError> {
        let user = self
            .state()?
            .users
            .get_mut(&user_id)
            .ok_or(LedgerError::UserNotFound(user_id))?;
        if user.referral_bonus_paid {
            return Ok(false);
        }
        user.referral_bonus_paid = true;
        Ok(true)
    }

    async fn count_qualified_referrals(
        &mut self,
        referrer_id: UserId,
        currency: Currency,
        min_amount: Decimal,
    ) -> Result<u64, LedgerError> {
        let state = self.state()?;
        let referred: HashSet<UserId> = state
            .users
            .values()
            .filter(|u| u.referred_by_user_id == Some(referrer_id))
            .map(|u| u.user_id)
            .collect();
        let qualified: HashSet<UserId> = state
            .topups
            .values()
            .filter(|t| {
                referred.contains(&t.user_id)
                    && t.status == TopupStatus::Approved
                    && t.currency == currency
                    && t.amount >= min_amount
            })
            .map(|t| t.user_id)
            .collect();
        Ok(qualified.len() as u64)
    }

    async fn lock_wallet(&mut self, user_id: UserId) -> Result<Wallet, LedgerError> {
        self.state()?
            .wallets
            .get(&user_id)
            .cloned()
            .ok_or(LedgerError::WalletNotFound(user_id))
    }

    async fn post(&mut self, posting: Posting) -> Result<LedgerEntry, LedgerError> {
        let state = self.state()?;
        let wallet = state
            .wallets
            .get_mut(&posting.user_id)
            .ok_or(LedgerError::WalletNotFound(posting.user_id))?;

        // Check every delta before touching anything.
        let mut next = wallet.balances();
        for (currency, delta) in posting.deltas() {
            next.add(currency, delta);
            if next.get(currency) < Decimal::ZERO {
                return Err(LedgerError::InsufficientBalance(currency));
            }
            check_range(next.get(currency))?;
        }

        let now = Utc::now();
        wallet.htg = round_money(next.htg);
        wallet.usd = round_money(next.usd);
        wallet.updated_at = now;

        let id = MemoryState::next_id(&mut state.next_entry_id);
        let entry = posting.into_entry(id, now);
        state.entries.push(entry.clone());
        Ok(entry)
    }

    async fn insert_topup(&mut self, new: NewTopupRequest) -> Result<TopupRequest, LedgerError> {
        let state = self.state()?;
        let id = MemoryState::next_id(&mut state.next_topup_id);
        let request = TopupRequest::from_new(new, id, Utc::now());
        state.topups.insert(id, request.clone());
        Ok(request)
    }

    async fn get_topup(&mut self, id: TopupId) -> Result<Option<TopupRequest>, LedgerError> {
        Ok(self.state()?.topups.get(&id).cloned())
    }

    async fn decide_topup_if_pending(
        &mut self,
        id: TopupId,
        decision: &DecisionRecord,
    ) -> Result<Option<TopupRequest>, LedgerError> {
        let Some(request) = self.state()?.topups.get_mut(&id) else {
            return Ok(None);
        };
        if request.status != TopupStatus::Pending {
            return Ok(None);
        }
        request.status = decision.decision.status();
        request.admin_note = decision.admin_note.clone();
        request.decided_by = Some(decision.admin_id);
        request.decided_at = Some(decision.decided_at);
        Ok(Some(request.clone()))
    }

    async fn get_fx(&mut self) -> Result<FxSetting, LedgerError> {
        Ok(self.state()?.fx.get_or_insert_with(FxSetting::default).clone())
    }

    async fn set_fx(&mut self, fx: &FxSetting) -> Result<(), LedgerError> {
        self.state()?.fx = Some(fx.clone());
        Ok(())
    }

    async fn insert_partner(&mut self, new: &NewPartner) -> Result<Partner, LedgerError> {
        let state = self.state()?;
        let id = MemoryState::next_id(&mut state.next_partner_id);
        let now = Utc::now();
        let partner = Partner {
            id,
            name: new.name.trim().to_string(),
            category: new.category.trim().to_string(),
            url: new.url.trim().to_string(),
            description: new.description.clone(),
            logo_url: new.logo_url.clone(),
            active: new.active,
            created_at: now,
            updated_at: now,
        };
        state.partners.insert(id, partner.clone());
        Ok(partner)
    }

    async fn get_partner(&mut self, id: PartnerId) -> Result<Option<Partner>, LedgerError> {
        Ok(self.state()?.partners.get(&id).cloned())
    }

    async fn set_partner_active(
        &mut self,
        id: PartnerId,
        active: bool,
    ) -> Result<Option<Partner>, LedgerError> {
        let Some(partner) = self.state()?.partners.get_mut(&id) else {
            return Ok(None);
        };
        partner.active = active;
        partner.updated_at = Utc::now();
        Ok(Some(partner.clone()))
    }

    async fn commit(&mut self) -> Result<(), LedgerError> {
        let mut guard = self.guard.take().ok_or_else(finished_unit)?;
        *guard = std::mem::take(&mut self.work);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Direction;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn htg_out(uid: UserId, amount: &str) -> Posting {
        let (out, htg) = (Direction::TransferOut, Currency::Htg);
        Posting::debit(uid, EntryType::Transfer, out, htg, d(amount), "").unwrap()
    }

    async fn seeded() -> (MemoryStore, UserId) {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let user = uow.insert_user(&NewUser::new("a@test.ht")).await.unwrap();
        let seed = Posting::credit(
            user.user_id,
            EntryType::AdminAdjust,
            Direction::AdminCredit,
            Currency::Htg,
            d("100"),
            "",
        )
        .unwrap();
        uow.post(seed).await.unwrap();
        uow.commit().await.unwrap();
        (store, user.user_id)
    }

    #[tokio::test]
    async fn test_uncommitted_unit_rolls_back() {
        let (store, uid) = seeded().await;
        {
            let mut uow = store.begin().await.unwrap();
            uow.post(htg_out(uid, "40")).await.unwrap();
            // dropped without commit
        }
        let wallet = store.get_wallet(uid).await.unwrap().unwrap();
        assert_eq!(wallet.htg, d("100"));
        assert_eq!(store.all_entries(uid).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_post_rejects_overdraft_without_effect() {
        let (store, uid) = seeded().await;
        let mut uow = store.begin().await.unwrap();
        let err = uow.post(htg_out(uid, "100.01")).await.unwrap_err();
        assert_eq!(err, LedgerError::InsufficientBalance(Currency::Htg));
        assert_eq!(uow.lock_wallet(uid).await.unwrap().htg, d("100"));
    }

    #[tokio::test]
    async fn test_post_rejects_balance_above_ceiling() {
        let (store, uid) = seeded().await;
        let mut uow = store.begin().await.unwrap();
        let credit = Posting::credit(
            uid,
            EntryType::AdminAdjust,
            Direction::AdminCredit,
            Currency::Htg,
            crate::money::MAX_AMOUNT,
            "",
        )
        .unwrap();
        assert!(matches!(uow.post(credit).await, Err(LedgerError::InvalidAmount(_))));
        assert_eq!(uow.lock_wallet(uid).await.unwrap().htg, d("100"));
    }

    #[tokio::test]
    async fn test_post_unknown_wallet() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let credit =
            Posting::credit(42, EntryType::Topup, Direction::ManualTopup, Currency::Usd, d("1"), "")
                .unwrap();
        let err = uow.post(credit).await.unwrap_err();
        assert_eq!(err, LedgerError::WalletNotFound(42));
    }

    #[tokio::test]
    async fn test_commit_twice_fails() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        uow.commit().await.unwrap();
        assert!(matches!(uow.commit().await, Err(LedgerError::Internal(_))));
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let (store, _) = seeded().await;
        let mut uow = store.begin().await.unwrap();
        let err = uow.insert_user(&NewUser::new(" A@TEST.HT")).await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateUser(_)));
    }

    #[tokio::test]
    async fn test_fx_lazily_defaulted() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let fx = uow.get_fx().await.unwrap();
        assert_eq!(fx.sell_usd, d("134"));
        assert_eq!(fx.buy_usd, d("126"));
    }
}
