//! FX rate pair
//!
//! `sell_usd`: HTG paid per USD when a user converts HTG -> USD.
//! `buy_usd`:  HTG received per USD when a user converts USD -> HTG.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core_types::Currency;
use crate::error::LedgerError;
use crate::money::{check_range, round_money};

/// Decimal places a stored rate may carry (`NUMERIC(20, 6)`)
pub const RATE_DP: u32 = 6;

/// Default HTG per USD when selling USD to users
pub const DEFAULT_SELL_USD: Decimal = Decimal::from_parts(134, 0, 0, false, 0);

/// Default HTG per USD when buying USD from users
pub const DEFAULT_BUY_USD: Decimal = Decimal::from_parts(126, 0, 0, false, 0);

/// Singleton FX setting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxSetting {
    pub sell_usd: Decimal,
    pub buy_usd: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl Default for FxSetting {
    fn default() -> Self {
        Self {
            sell_usd: DEFAULT_SELL_USD,
            buy_usd: DEFAULT_BUY_USD,
            updated_at: Utc::now(),
        }
    }
}

impl FxSetting {
    /// Build a validated rate pair.
    ///
    /// Both rates must be positive with at most [`RATE_DP`] decimals, and
    /// `sell_usd >= buy_usd`; an inverted spread would let a
    /// HTG -> USD -> HTG round trip mint money.
    pub fn new(sell_usd: Decimal, buy_usd: Decimal) -> Result<Self, LedgerError> {
        if sell_usd <= Decimal::ZERO || buy_usd <= Decimal::ZERO {
            return Err(LedgerError::InvalidFxRate(format!(
                "rates must be positive (sell_usd={}, buy_usd={})",
                sell_usd, buy_usd
            )));
        }
        for rate in [sell_usd, buy_usd] {
            if rate.normalize().scale() > RATE_DP {
                return Err(LedgerError::InvalidFxRate(format!(
                    "rate {} has more than {} decimal places",
                    rate, RATE_DP
                )));
            }
        }
        if sell_usd < buy_usd {
            return Err(LedgerError::InvalidFxRate(format!(
                "sell_usd {} is below buy_usd {}",
                sell_usd, buy_usd
            )));
        }
        Ok(Self {
            sell_usd,
            buy_usd,
            updated_at: Utc::now(),
        })
    }

    /// Rate applied in the given direction
    #[inline]
    pub fn rate_for(&self, direction: ConversionDirection) -> Decimal {
        match direction {
            ConversionDirection::HtgToUsd => self.sell_usd,
            ConversionDirection::UsdToHtg => self.buy_usd,
        }
    }

    /// Amount credited in the target currency for `amount_in` of the source currency.
    ///
    /// Fails with `InvalidAmount` when the result leaves the storable range.
    pub fn convert(
        &self,
        direction: ConversionDirection,
        amount_in: Decimal,
    ) -> Result<Decimal, LedgerError> {
        let rate = self.rate_for(direction);
        let raw = match direction {
            ConversionDirection::HtgToUsd => amount_in.checked_div(rate),
            ConversionDirection::UsdToHtg => amount_in.checked_mul(rate),
        }
        .ok_or_else(|| {
            LedgerError::InvalidAmount(format!(
                "{} {} overflows at rate {}",
                amount_in,
                direction.from_currency(),
                rate
            ))
        })?;
        check_range(raw)?;
        Ok(round_money(raw))
    }
}

/// In-wallet conversion direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionDirection {
    HtgToUsd,
    UsdToHtg,
}

impl ConversionDirection {
    pub fn from_currency(&self) -> Currency {
        match self {
            ConversionDirection::HtgToUsd => Currency::Htg,
            ConversionDirection::UsdToHtg => Currency::Usd,
        }
    }

    pub fn to_currency(&self) -> Currency {
        self.from_currency().counter()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionDirection::HtgToUsd => "htg_to_usd",
            ConversionDirection::UsdToHtg => "usd_to_htg",
        }
    }
}

impl fmt::Display for ConversionDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversionDirection {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "htg_to_usd" => Ok(ConversionDirection::HtgToUsd),
            "usd_to_htg" => Ok(ConversionDirection::UsdToHtg),
            other => Err(LedgerError::InvalidDecision(format!(
                "unknown conversion direction: {}",
                other
            ))),
        }
    }
}
