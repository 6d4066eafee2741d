use std::sync::Arc;

use super::models::{NewUser, UserRecord, normalize_email};
use crate::core_types::{Principal, Role, UserId};
use crate::error::LedgerError;
use crate::store::LedgerStore;

/// User registration, lookup and deletion
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn LedgerStore>,
}

impl AccountService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Create a user and its zero wallet atomically.
    pub async fn register(&self, new: NewUser) -> Result<UserRecord, LedgerError> {
        let email = normalize_email(&new.email);
        if email.is_empty() || !email.contains('@') {
            return Err(LedgerError::InvalidRequest(format!(
                "invalid email: {:?}",
                new.email
            )));
        }

        let mut uow = self.store.begin().await?;
        let user = uow.insert_user(&NewUser { email, ..new }).await?;
        uow.commit().await?;

        tracing::info!(
            user_id = user.user_id,
            role = %user.role,
            referred_by = ?user.referred_by_user_id,
            "User registered"
        );
        Ok(user)
    }

    pub async fn get_user(&self, user_id: UserId) -> Result<UserRecord, LedgerError> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or(LedgerError::UserNotFound(user_id))
    }

    /// Delete a user that never touched the ledger.
    ///
    /// Superadmins are never deleted. Users owning ledger entries or topup
    /// requests are refused with `DeletionForbidden`. Users they referred
    /// keep existing with the back-reference cleared.
    pub async fn delete_user(&self, actor: &Principal, target: UserId) -> Result<(), LedgerError> {
        actor.require_superadmin()?;

        let mut uow = self.store.begin().await?;
        let user = uow
            .lock_user(target)
            .await?
            .ok_or(LedgerError::UserNotFound(target))?;

        if user.role == Role::Superadmin {
            return Err(LedgerError::DeletionForbidden(
                "superadmin accounts cannot be deleted".into(),
            ));
        }
        if uow.has_history(target).await? {
            return Err(LedgerError::DeletionForbidden(format!(
                "user {} has ledger history",
                target
            )));
        }

        uow.delete_user(target).await?;
        uow.commit().await?;

        tracing::info!(user_id = target, deleted_by = actor.user_id, "User deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{Currency, UserStatus};
    use crate::ledger::{Direction, EntryType, Posting};
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;

    fn setup() -> (Arc<dyn LedgerStore>, AccountService) {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryStore::new());
        let accounts = AccountService::new(store.clone());
        (store, accounts)
    }

    fn root() -> Principal {
        Principal::new(1, Role::Superadmin, UserStatus::Active)
    }

    #[tokio::test]
    async fn test_register_creates_zero_wallet() {
        let (store, accounts) = setup();
        let user = accounts.register(NewUser::new(" Bob@Mail.HT ")).await.unwrap();
        assert_eq!(user.email, "bob@mail.ht");

        let wallet = store.get_wallet(user.user_id).await.unwrap().unwrap();
        assert_eq!(wallet.htg, Decimal::ZERO);
        assert_eq!(wallet.usd, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_email_and_unknown_referrer() {
        let (_, accounts) = setup();
        assert!(matches!(
            accounts.register(NewUser::new("  ")).await,
            Err(LedgerError::InvalidRequest(_))
        ));
        assert_eq!(
            accounts
                .register(NewUser::new("x@y.z").referred_by(77))
                .await
                .unwrap_err(),
            LedgerError::UserNotFound(77)
        );
    }

    #[tokio::test]
    async fn test_delete_user_policy() {
        let (store, accounts) = setup();
        let boss = accounts
            .register(NewUser::new("boss@w.ht").with_role(Role::Superadmin))
            .await
            .unwrap();
        let referrer = accounts.register(NewUser::new("r@w.ht")).await.unwrap();
        let referred = accounts
            .register(NewUser::new("f@w.ht").referred_by(referrer.user_id))
            .await
            .unwrap();
        let active = accounts.register(NewUser::new("a@w.ht")).await.unwrap();

        // superadmin never deleted
        assert!(matches!(
            accounts.delete_user(&root(), boss.user_id).await,
            Err(LedgerError::DeletionForbidden(_))
        ));

        // history blocks deletion
        let mut uow = store.begin().await.unwrap();
        uow.post(
            Posting::credit(
                active.user_id,
                EntryType::AdminAdjust,
                Direction::AdminCredit,
                Currency::Htg,
                Decimal::ONE,
                "",
            )
            .unwrap(),
        )
        .await
        .unwrap();
        uow.commit().await.unwrap();
        assert!(matches!(
            accounts.delete_user(&root(), active.user_id).await,
            Err(LedgerError::DeletionForbidden(_))
        ));

        // plain admin may not delete
        let admin = Principal::new(2, Role::Admin, UserStatus::Active);
        assert!(matches!(
            accounts.delete_user(&admin, referrer.user_id).await,
            Err(LedgerError::Forbidden(_))
        ));

        accounts.delete_user(&root(), referrer.user_id).await.unwrap();
        assert!(store.get_wallet(referrer.user_id).await.unwrap().is_none());
        let orphan = accounts.get_user(referred.user_id).await.unwrap();
        assert_eq!(orphan.referred_by_user_id, None);
    }
}
