//! Fee revenue and activity totals for the admin dashboard

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core_types::Principal;
use crate::error::LedgerError;
use crate::ledger::{Balances, EntryType};
use crate::store::LedgerStore;

/// Totals per currency since `since`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodStats {
    pub since: DateTime<Utc>,
    pub days: u32,
    /// Sum of fee audit entries
    pub fees: Balances,
    /// Net amounts credited by approved topups
    pub topups: Balances,
    pub partner_spend: Balances,
}

#[derive(Clone)]
pub struct StatsService {
    store: Arc<dyn LedgerStore>,
}

impl StatsService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// All-time fee totals
    pub async fn fee_totals(&self, admin: &Principal) -> Result<Balances, LedgerError> {
        admin.require_admin()?;
        self.store.sum_entries(EntryType::Fee, None).await
    }

    pub async fn period_stats(
        &self,
        admin: &Principal,
        days: u32,
    ) -> Result<PeriodStats, LedgerError> {
        admin.require_admin()?;
        if days == 0 {
            return Err(LedgerError::InvalidRequest("days must be at least 1".into()));
        }
        let since = Duration::try_days(i64::from(days))
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .ok_or_else(|| {
                LedgerError::InvalidRequest(format!("{} days reaches before the calendar", days))
            })?;
        Ok(PeriodStats {
            since,
            days,
            fees: self.store.sum_entries(EntryType::Fee, Some(since)).await?,
            topups: self.store.sum_entries(EntryType::Topup, Some(since)).await?,
            partner_spend: self.store.sum_entries(EntryType::PartnerSpend, Some(since)).await?,
        })
    }
}
