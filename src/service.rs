//! WalletCore - the operations the API layer calls
//!
//! Bundles every service over one store. The API layer hands in an
//! authenticated [`Principal`] and already-parsed values; role and
//! ownership checks happen here or in the service behind each call.

use rust_decimal::Decimal;
use std::sync::Arc;

use crate::account::{AccountService, NewUser, UserRecord};
use crate::config::AppConfig;
use crate::convert::{ConversionReceipt, ConverterService};
use crate::core_types::{Currency, PartnerId, Principal, TopupId, UserId};
use crate::error::LedgerError;
use crate::fx::{ConversionDirection, FxSetting};
use crate::ledger::{Balances, LedgerEntry, TxFilter};
use crate::partner::{NewPartner, Partner, PartnerService};
use crate::referral::{ReferralPolicy, ReferralRewardEngine};
use crate::stats::{PeriodStats, StatsService};
use crate::store::LedgerStore;
use crate::topup::{Decision, DecisionOutcome, TopupInput, TopupRequest, TopupWorkflow};
use crate::transfer::{TransferReceipt, TransferService};
use crate::wallet::{AdjustOutcome, ReconcileReport, Wallet, WalletService};

#[derive(Clone)]
pub struct WalletCore {
    store: Arc<dyn LedgerStore>,
    accounts: AccountService,
    wallets: WalletService,
    transfers: TransferService,
    converter: ConverterService,
    topups: TopupWorkflow,
    partners: PartnerService,
    stats: StatsService,
}

impl WalletCore {
    pub fn new(store: Arc<dyn LedgerStore>, referral: ReferralPolicy) -> Self {
        Self {
            accounts: AccountService::new(store.clone()),
            wallets: WalletService::new(store.clone()),
            transfers: TransferService::new(store.clone()),
            converter: ConverterService::new(store.clone()),
            topups: TopupWorkflow::new(store.clone(), ReferralRewardEngine::new(referral)),
            partners: PartnerService::new(store.clone()),
            stats: StatsService::new(store.clone()),
            store,
        }
    }

    pub fn from_config(store: Arc<dyn LedgerStore>, config: &AppConfig) -> Self {
        Self::new(store, config.referral.clone().into())
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    // === Accounts ===

    pub async fn register_user(&self, new: NewUser) -> Result<UserRecord, LedgerError> {
        self.accounts.register(new).await
    }

    pub async fn get_user(&self, user_id: UserId) -> Result<UserRecord, LedgerError> {
        self.accounts.get_user(user_id).await
    }

    pub async fn delete_user(&self, actor: &Principal, target: UserId) -> Result<(), LedgerError> {
        self.accounts.delete_user(actor, target).await
    }

    // === Wallet ===

    pub async fn get_wallet(
        &self,
        caller: &Principal,
        user_id: UserId,
    ) -> Result<Wallet, LedgerError> {
        caller.require_owner_or_admin(user_id)?;
        self.wallets.get_wallet(user_id).await
    }

    pub async fn list_transactions(
        &self,
        caller: &Principal,
        user_id: UserId,
        filter: &TxFilter,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        caller.require_owner_or_admin(user_id)?;
        self.wallets.list_transactions(user_id, filter).await
    }

    pub async fn transfer(
        &self,
        caller: &Principal,
        to_email: &str,
        currency: Currency,
        amount: Decimal,
        note: &str,
    ) -> Result<TransferReceipt, LedgerError> {
        self.transfers.transfer(caller, to_email, currency, amount, note).await
    }

    pub async fn convert(
        &self,
        caller: &Principal,
        direction: ConversionDirection,
        amount: Decimal,
    ) -> Result<ConversionReceipt, LedgerError> {
        self.converter.convert(caller, direction, amount).await
    }

    pub async fn adjust_wallet(
        &self,
        admin: &Principal,
        target: UserId,
        currency: Currency,
        signed_amount: Decimal,
        note: &str,
    ) -> Result<AdjustOutcome, LedgerError> {
        self.wallets.adjust(admin, target, currency, signed_amount, note).await
    }

    pub async fn reconcile(
        &self,
        caller: &Principal,
        user_id: UserId,
    ) -> Result<ReconcileReport, LedgerError> {
        caller.require_owner_or_admin(user_id)?;
        self.wallets.reconcile(user_id).await
    }

    /// Operator sweep; returns inconsistent wallets only
    pub async fn reconcile_all(&self) -> Result<Vec<ReconcileReport>, LedgerError> {
        self.wallets.reconcile_all().await
    }

    // === Topups ===

    pub async fn create_topup_request(
        &self,
        caller: &Principal,
        input: TopupInput,
    ) -> Result<TopupRequest, LedgerError> {
        self.topups.create_request(caller, input).await
    }

    pub async fn list_my_topup_requests(
        &self,
        caller: &Principal,
    ) -> Result<Vec<TopupRequest>, LedgerError> {
        caller.require_active()?;
        self.topups.list_mine(caller.user_id).await
    }

    pub async fn list_pending_topup_requests(
        &self,
        admin: &Principal,
    ) -> Result<Vec<TopupRequest>, LedgerError> {
        self.topups.list_pending(admin).await
    }

    pub async fn decide_topup_request(
        &self,
        admin: &Principal,
        request_id: TopupId,
        decision: Decision,
        admin_note: Option<String>,
    ) -> Result<DecisionOutcome, LedgerError> {
        self.topups.decide(admin, request_id, decision, admin_note).await
    }

    // === FX ===

    pub async fn get_fx(&self) -> Result<FxSetting, LedgerError> {
        self.converter.get_fx().await
    }

    pub async fn set_fx(
        &self,
        admin: &Principal,
        sell_usd: Decimal,
        buy_usd: Decimal,
    ) -> Result<FxSetting, LedgerError> {
        self.converter.set_fx(admin, sell_usd, buy_usd).await
    }

    // === Partners ===

    pub async fn register_partner(
        &self,
        admin: &Principal,
        new: NewPartner,
    ) -> Result<Partner, LedgerError> {
        self.partners.register(admin, new).await
    }

    pub async fn set_partner_active(
        &self,
        admin: &Principal,
        id: PartnerId,
        active: bool,
    ) -> Result<Partner, LedgerError> {
        self.partners.set_active(admin, id, active).await
    }

    pub async fn list_partners(&self, active_only: bool) -> Result<Vec<Partner>, LedgerError> {
        self.partners.list(active_only).await
    }

    pub async fn spend_at_partner(
        &self,
        caller: &Principal,
        partner_id: PartnerId,
        currency: Currency,
        amount: Decimal,
        note: &str,
    ) -> Result<LedgerEntry, LedgerError> {
        self.partners.spend(caller, partner_id, currency, amount, note).await
    }

    // === Stats ===

    pub async fn fee_totals(&self, admin: &Principal) -> Result<Balances, LedgerError> {
        self.stats.fee_totals(admin).await
    }

    pub async fn period_stats(
        &self,
        admin: &Principal,
        days: u32,
    ) -> Result<PeriodStats, LedgerError> {
        self.stats.period_stats(admin, days).await
    }
}
