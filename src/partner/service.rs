use rust_decimal::Decimal;
use std::sync::Arc;

use super::models::{NewPartner, Partner};
use crate::core_types::{Currency, PartnerId, Principal};
use crate::error::LedgerError;
use crate::ledger::{self, Direction, EntryType, LedgerEntry, Posting};
use crate::money::require_positive;
use crate::store::LedgerStore;

const MAX_NAME_LEN: usize = 120;
const MAX_URL_LEN: usize = 300;

#[derive(Clone)]
pub struct PartnerService {
    store: Arc<dyn LedgerStore>,
}

impl PartnerService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn register(
        &self,
        admin: &Principal,
        new: NewPartner,
    ) -> Result<Partner, LedgerError> {
        admin.require_admin()?;
        let name = new.name.trim();
        let url = new.url.trim();
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(LedgerError::InvalidRequest(format!(
                "partner name must be 1-{} characters",
                MAX_NAME_LEN
            )));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) || url.len() > MAX_URL_LEN
        {
            return Err(LedgerError::InvalidRequest(format!(
                "invalid partner url: {}",
                url
            )));
        }

        let mut uow = self.store.begin().await?;
        let partner = uow.insert_partner(&new).await?;
        uow.commit().await?;

        tracing::info!(partner_id = partner.id, name = %partner.name, "Partner registered");
        Ok(partner)
    }

    pub async fn set_active(
        &self,
        admin: &Principal,
        id: PartnerId,
        active: bool,
    ) -> Result<Partner, LedgerError> {
        admin.require_admin()?;
        let mut uow = self.store.begin().await?;
        let partner = uow
            .set_partner_active(id, active)
            .await?
            .ok_or(LedgerError::PartnerInactiveOrNotFound(id))?;
        uow.commit().await?;

        tracing::info!(partner_id = id, active, "Partner status changed");
        Ok(partner)
    }

    pub async fn list(&self, active_only: bool) -> Result<Vec<Partner>, LedgerError> {
        self.store.list_partners(active_only).await
    }

    /// Debit the user's wallet for a purchase at an active partner.
    pub async fn spend(
        &self,
        user: &Principal,
        partner_id: PartnerId,
        currency: Currency,
        amount: Decimal,
        note: &str,
    ) -> Result<LedgerEntry, LedgerError> {
        user.require_active()?;
        let amount = require_positive(amount)?;

        let mut uow = self.store.begin().await?;
        let partner = uow
            .get_partner(partner_id)
            .await?
            .filter(|p| p.active)
            .ok_or(LedgerError::PartnerInactiveOrNotFound(partner_id))?;

        let note = match note.trim() {
            "" => format!("partner #{} {}", partner.id, partner.name),
            n => format!("partner #{} {}: {}", partner.id, partner.name, n),
        };
        uow.lock_wallet(user.user_id).await?;
        let entry = uow
            .post(Posting::debit(
                user.user_id,
                EntryType::PartnerSpend,
                Direction::PartnerSpend,
                currency,
                amount,
                note,
            )?)
            .await?;
        uow.commit().await?;

        ledger::log_committed(&[&entry]);
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountService, NewUser};
    use crate::core_types::{Role, UserStatus};
    use crate::store::MemoryStore;
    use crate::wallet::{EntrySpec, WalletService};

    fn admin() -> Principal {
        Principal::new(1000, Role::Admin, UserStatus::Active)
    }

    async fn setup() -> (PartnerService, WalletService, Principal) {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryStore::new());
        let user = AccountService::new(store.clone())
            .register(NewUser::new("shop@w.ht"))
            .await
            .unwrap();
        let wallets = WalletService::new(store.clone());
        wallets
            .credit(
                user.user_id,
                Currency::Usd,
                Decimal::from(20),
                EntrySpec::new(EntryType::Topup, Direction::Credit, "seed"),
            )
            .await
            .unwrap();
        (PartnerService::new(store), wallets, user.principal())
    }

    #[tokio::test]
    async fn test_spend_at_active_partner() {
        let (partners, wallets, user) = setup().await;
        let p = partners
            .register(&admin(), NewPartner::new("Kafe Lakay", "https://kafe.ht"))
            .await
            .unwrap();
        assert_eq!(p.category, "autre");

        let entry = partners
            .spend(&user, p.id, Currency::Usd, Decimal::new(1250, 2), "lunch")
            .await
            .unwrap();
        assert_eq!(entry.entry_type, EntryType::PartnerSpend);
        assert_eq!(entry.note, format!("partner #{} Kafe Lakay: lunch", p.id));
        assert_eq!(
            wallets.get_wallet(user.user_id).await.unwrap().usd,
            Decimal::new(750, 2)
        );
    }

    #[tokio::test]
    async fn test_inactive_or_unknown_partner() {
        let (partners, wallets, user) = setup().await;
        let p = partners
            .register(&admin(), NewPartner::new("Closed", "https://closed.ht"))
            .await
            .unwrap();
        partners.set_active(&admin(), p.id, false).await.unwrap();

        for id in [p.id, 4242] {
            assert_eq!(
                partners
                    .spend(&user, id, Currency::Usd, Decimal::ONE, "")
                    .await
                    .unwrap_err(),
                LedgerError::PartnerInactiveOrNotFound(id)
            );
        }
        assert_eq!(wallets.get_wallet(user.user_id).await.unwrap().usd, Decimal::from(20));
        assert!(partners.list(true).await.unwrap().is_empty());
        assert_eq!(partners.list(false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (partners, _, user) = setup().await;
        assert!(matches!(
            partners
                .register(&admin(), NewPartner::new("", "https://x.ht"))
                .await,
            Err(LedgerError::InvalidRequest(_))
        ));
        assert!(matches!(
            partners
                .register(&admin(), NewPartner::new("X", "ftp://x.ht"))
                .await,
            Err(LedgerError::InvalidRequest(_))
        ));
        assert!(matches!(
            partners
                .register(&user, NewPartner::new("X", "https://x.ht"))
                .await,
            Err(LedgerError::Forbidden(_))
        ));
    }
}
