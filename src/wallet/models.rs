use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{Currency, UserId};
use crate::ledger::{Balances, LedgerEntry};

/// Current balances of one user. Both balances are always >= 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: UserId,
    pub htg: Decimal,
    pub usd: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            htg: Decimal::new(0, 2),
            usd: Decimal::new(0, 2),
            updated_at: Utc::now(),
        }
    }

    pub fn balance(&self, currency: Currency) -> Decimal {
        match currency {
            Currency::Htg => self.htg,
            Currency::Usd => self.usd,
        }
    }

    pub fn balances(&self) -> Balances {
        Balances {
            htg: self.htg,
            usd: self.usd,
        }
    }
}

/// Result of an admin adjustment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustOutcome {
    pub entry: LedgerEntry,
    pub wallet: Wallet,
}

/// Wallet balances compared against the replayed ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub user_id: UserId,
    pub wallet: Balances,
    pub ledger: Balances,
}

impl ReconcileReport {
    pub fn is_consistent(&self) -> bool {
        self.wallet == self.ledger
    }
}
