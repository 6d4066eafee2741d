use rust_decimal::Decimal;
use std::sync::Arc;

use super::models::{AdjustOutcome, ReconcileReport, Wallet};
use crate::core_types::{Currency, Principal, UserId};
use crate::error::LedgerError;
use crate::ledger::{self, Direction, EntryType, LedgerEntry, Posting, TxFilter};
use crate::money::require_nonzero;
use crate::store::LedgerStore;

/// What kind of ledger entry a credit or debit records
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySpec {
    pub entry_type: EntryType,
    pub direction: Direction,
    pub note: String,
}

impl EntrySpec {
    pub fn new(entry_type: EntryType, direction: Direction, note: impl Into<String>) -> Self {
        Self {
            entry_type,
            direction,
            note: note.into(),
        }
    }
}

#[derive(Clone)]
pub struct WalletService {
    store: Arc<dyn LedgerStore>,
}

impl WalletService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn get_wallet(&self, user_id: UserId) -> Result<Wallet, LedgerError> {
        self.store
            .get_wallet(user_id)
            .await?
            .ok_or(LedgerError::WalletNotFound(user_id))
    }

    /// Newest first
    pub async fn list_transactions(
        &self,
        user_id: UserId,
        filter: &TxFilter,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.store.list_entries(user_id, filter).await
    }

    /// Increase a balance, recording `entry` for it.
    pub async fn credit(
        &self,
        user_id: UserId,
        currency: Currency,
        amount: Decimal,
        entry: EntrySpec,
    ) -> Result<AdjustOutcome, LedgerError> {
        let posting = Posting::credit(
            user_id,
            entry.entry_type,
            entry.direction,
            currency,
            amount,
            entry.note,
        )?;
        self.apply(posting).await
    }

    /// Decrease a balance, recording `entry` for it. Never overdraws.
    pub async fn debit(
        &self,
        user_id: UserId,
        currency: Currency,
        amount: Decimal,
        entry: EntrySpec,
    ) -> Result<AdjustOutcome, LedgerError> {
        let posting = Posting::debit(
            user_id,
            entry.entry_type,
            entry.direction,
            currency,
            amount,
            entry.note,
        )?;
        self.apply(posting).await
    }

    /// Manual correction by an admin: positive credits, negative debits.
    pub async fn adjust(
        &self,
        admin: &Principal,
        target: UserId,
        currency: Currency,
        signed_amount: Decimal,
        note: &str,
    ) -> Result<AdjustOutcome, LedgerError> {
        admin.require_admin()?;
        let signed_amount = require_nonzero(signed_amount)?;
        let note = if note.trim().is_empty() {
            format!("adjusted by admin {}", admin.user_id)
        } else {
            note.trim().to_string()
        };

        let spec = if signed_amount > Decimal::ZERO {
            EntrySpec::new(EntryType::AdminAdjust, Direction::AdminCredit, note)
        } else {
            EntrySpec::new(EntryType::AdminAdjust, Direction::AdminDebit, note)
        };

        let result = if signed_amount > Decimal::ZERO {
            self.credit(target, currency, signed_amount, spec).await
        } else {
            self.debit(target, currency, -signed_amount, spec).await
        };

        match &result {
            Ok(outcome) => tracing::info!(
                admin_id = admin.user_id,
                user_id = target,
                %currency,
                amount = %signed_amount,
                balance = %outcome.wallet.balance(currency),
                "Wallet adjusted"
            ),
            Err(e) => tracing::warn!(
                admin_id = admin.user_id,
                user_id = target,
                %currency,
                amount = %signed_amount,
                "Wallet adjustment rejected: {}",
                e
            ),
        }
        result
    }

    /// Compare the wallet with the balances its ledger implies.
    pub async fn reconcile(&self, user_id: UserId) -> Result<ReconcileReport, LedgerError> {
        let wallet = self.get_wallet(user_id).await?;
        let entries = self.store.all_entries(user_id).await?;
        Ok(ReconcileReport {
            user_id,
            wallet: wallet.balances(),
            ledger: ledger::reconcile(&entries),
        })
    }

    /// Reconcile every wallet; returns only the inconsistent ones.
    pub async fn reconcile_all(&self) -> Result<Vec<ReconcileReport>, LedgerError> {
        let user_ids = self.store.wallet_user_ids().await?;
        let mut mismatches = Vec::new();
        for user_id in &user_ids {
            let report = self.reconcile(*user_id).await?;
            if !report.is_consistent() {
                tracing::error!(
                    user_id,
                    wallet = ?report.wallet,
                    ledger = ?report.ledger,
                    "Wallet does not match its ledger"
                );
                mismatches.push(report);
            }
        }
        tracing::info!(
            wallets = user_ids.len(),
            mismatches = mismatches.len(),
            "Reconciliation finished"
        );
        Ok(mismatches)
    }

    async fn apply(&self, posting: Posting) -> Result<AdjustOutcome, LedgerError> {
        let user_id = posting.user_id;
        let mut uow = self.store.begin().await?;
        uow.lock_wallet(user_id).await?;
        let entry = uow.post(posting).await?;
        let wallet = uow.lock_wallet(user_id).await?;
        uow.commit().await?;

        ledger::log_committed(&[&entry]);
        Ok(AdjustOutcome { entry, wallet })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountService, NewUser};
    use crate::core_types::{Role, UserStatus};
    use crate::store::MemoryStore;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    async fn setup() -> (WalletService, UserId) {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryStore::new());
        let user = AccountService::new(store.clone())
            .register(NewUser::new("w@test.ht"))
            .await
            .unwrap();
        (WalletService::new(store), user.user_id)
    }

    fn admin() -> Principal {
        Principal::new(99, Role::Admin, UserStatus::Active)
    }

    #[tokio::test]
    async fn test_adjust_credit_then_debit() {
        let (wallets, uid) = setup().await;
        let out = wallets
            .adjust(&admin(), uid, Currency::Usd, d("10.50"), "goodwill")
            .await
            .unwrap();
        assert_eq!(out.wallet.usd, d("10.50"));
        assert_eq!(out.entry.direction, Direction::AdminCredit);
        assert_eq!(out.entry.amount, d("10.50"));

        let out = wallets
            .adjust(&admin(), uid, Currency::Usd, d("-0.50"), "")
            .await
            .unwrap();
        assert_eq!(out.wallet.usd, d("10"));
        assert_eq!(out.entry.direction, Direction::AdminDebit);
        assert_eq!(out.entry.amount, d("0.50"));
        assert_eq!(out.entry.note, "adjusted by admin 99");
    }

    #[tokio::test]
    async fn test_adjust_rejects_overdraft_zero_and_non_admin() {
        let (wallets, uid) = setup().await;
        assert_eq!(
            wallets
                .adjust(&admin(), uid, Currency::Htg, d("-1"), "")
                .await
                .unwrap_err(),
            LedgerError::InsufficientBalance(Currency::Htg)
        );
        assert!(matches!(
            wallets.adjust(&admin(), uid, Currency::Htg, d("0"), "").await,
            Err(LedgerError::InvalidAmount(_))
        ));
        let user = Principal::new(uid, Role::User, UserStatus::Active);
        assert!(matches!(
            wallets.adjust(&user, uid, Currency::Htg, d("5"), "").await,
            Err(LedgerError::Forbidden(_))
        ));
        assert!(wallets.list_transactions(uid, &TxFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_wallet() {
        let (wallets, _) = setup().await;
        assert_eq!(
            wallets.get_wallet(404).await.unwrap_err(),
            LedgerError::WalletNotFound(404)
        );
        let spec = EntrySpec::new(EntryType::Topup, Direction::Credit, "");
        assert_eq!(
            wallets.credit(404, Currency::Htg, d("1"), spec).await.unwrap_err(),
            LedgerError::WalletNotFound(404)
        );
    }

    #[tokio::test]
    async fn test_reconcile_after_mixed_operations() {
        let (wallets, uid) = setup().await;
        let topup = EntrySpec::new(EntryType::Topup, Direction::Credit, "seed");
        wallets.credit(uid, Currency::Htg, d("300"), topup).await.unwrap();
        let transfer = EntrySpec::new(EntryType::Transfer, Direction::Debit, "");
        wallets.debit(uid, Currency::Htg, d("120.25"), transfer).await.unwrap();
        let report = wallets.reconcile(uid).await.unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.ledger.htg, d("179.75"));
        assert!(wallets.reconcile_all().await.unwrap().is_empty());
    }
}
