//! In-wallet currency conversion at the current FX rate pair

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core_types::{Principal, UserId};
use crate::error::LedgerError;
use crate::fx::{ConversionDirection, FxSetting};
use crate::ledger::{self, LedgerEntry, Posting};
use crate::money::require_positive;
use crate::store::LedgerStore;
use crate::wallet::Wallet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionReceipt {
    pub user_id: UserId,
    pub direction: ConversionDirection,
    pub amount_in: Decimal,
    pub amount_out: Decimal,
    pub rate_used: Decimal,
    pub entry: LedgerEntry,
    pub wallet: Wallet,
}

#[derive(Clone)]
pub struct ConverterService {
    store: Arc<dyn LedgerStore>,
}

impl ConverterService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Debit `amount` of the source currency, credit its converted value.
    pub async fn convert(
        &self,
        user: &Principal,
        direction: ConversionDirection,
        amount: Decimal,
    ) -> Result<ConversionReceipt, LedgerError> {
        user.require_active()?;
        let amount_in = require_positive(amount)?;

        let mut uow = self.store.begin().await?;
        let fx = uow.get_fx().await?;
        let rate = fx.rate_for(direction);
        let amount_out = fx.convert(direction, amount_in)?;
        if amount_out <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "{} {} converts to nothing at rate {}",
                amount_in,
                direction.from_currency(),
                rate
            )));
        }

        uow.lock_wallet(user.user_id).await?;
        let entry = uow
            .post(Posting::conversion(
                user.user_id,
                direction,
                amount_in,
                amount_out,
                rate,
            )?)
            .await?;
        let wallet = uow.lock_wallet(user.user_id).await?;
        uow.commit().await?;

        ledger::log_committed(&[&entry]);
        Ok(ConversionReceipt {
            user_id: user.user_id,
            direction,
            amount_in,
            amount_out,
            rate_used: rate,
            entry,
            wallet,
        })
    }

    /// Current rate pair, defaulted on first read
    pub async fn get_fx(&self) -> Result<FxSetting, LedgerError> {
        let mut uow = self.store.begin().await?;
        let fx = uow.get_fx().await?;
        uow.commit().await?;
        Ok(fx)
    }

    pub async fn set_fx(
        &self,
        admin: &Principal,
        sell_usd: Decimal,
        buy_usd: Decimal,
    ) -> Result<FxSetting, LedgerError> {
        admin.require_admin()?;
        let fx = FxSetting::new(sell_usd, buy_usd)?;

        let mut uow = self.store.begin().await?;
        uow.set_fx(&fx).await?;
        uow.commit().await?;

        tracing::info!(
            admin_id = admin.user_id,
            sell_usd = %fx.sell_usd,
            buy_usd = %fx.buy_usd,
            "FX rates updated"
        );
        Ok(fx)
    }
}
