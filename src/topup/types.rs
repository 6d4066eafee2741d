//! Topup Core Types
//!
//! Request record, status machine and decision payload for manual topups.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core_types::{Currency, TopupId, UserId};
use crate::error::LedgerError;

/// Topup request status
///
/// `Pending` is the only initial state; `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TopupStatus {
    Pending,
    Approved,
    Rejected,
}

impl TopupStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TopupStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TopupStatus::Pending => "PENDING",
            TopupStatus::Approved => "APPROVED",
            TopupStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for TopupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopupStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(TopupStatus::Pending),
            "APPROVED" => Ok(TopupStatus::Approved),
            "REJECTED" => Ok(TopupStatus::Rejected),
            _ => Err(format!("Invalid topup status: {}", s)),
        }
    }
}

/// Admin decision on a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn status(&self) -> TopupStatus {
        match self {
            Decision::Approved => TopupStatus::Approved,
            Decision::Rejected => TopupStatus::Rejected,
        }
    }
}

impl FromStr for Decision {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "APPROVED" => Ok(Decision::Approved),
            "REJECTED" => Ok(Decision::Rejected),
            other => Err(LedgerError::InvalidDecision(format!(
                "expected APPROVED or REJECTED, got {}",
                other
            ))),
        }
    }
}

/// How the user paid outside the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Moncash,
    Natcash,
    Interac,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Moncash => "moncash",
            PaymentMethod::Natcash => "natcash",
            PaymentMethod::Interac => "interac",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "moncash" => Ok(PaymentMethod::Moncash),
            "natcash" => Ok(PaymentMethod::Natcash),
            "interac" => Ok(PaymentMethod::Interac),
            _ => Err(format!("Invalid payment method: {}", s)),
        }
    }
}

/// User-submitted topup claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopupInput {
    pub amount: Decimal,
    pub currency: Currency,
    pub method: PaymentMethod,
    pub reference: String,
    pub proof_url: Option<String>,
    pub note: Option<String>,
}

/// Validated request ready for insertion, fee and net already computed
#[derive(Debug, Clone, PartialEq)]
pub struct NewTopupRequest {
    pub user_id: UserId,
    pub amount: Decimal,
    pub fee_amount: Decimal,
    pub net_amount: Decimal,
    pub currency: Currency,
    pub method: PaymentMethod,
    pub reference: String,
    pub proof_url: Option<String>,
    pub note: Option<String>,
}

/// Persisted topup request (`topup_requests` row)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopupRequest {
    pub id: TopupId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub fee_amount: Decimal,
    pub net_amount: Decimal,
    pub currency: Currency,
    pub method: PaymentMethod,
    pub reference: String,
    pub proof_url: Option<String>,
    pub note: Option<String>,
    pub status: TopupStatus,
    pub admin_note: Option<String>,
    pub decided_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl TopupRequest {
    pub fn from_new(new: NewTopupRequest, id: TopupId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: new.user_id,
            amount: new.amount,
            fee_amount: new.fee_amount,
            net_amount: new.net_amount,
            currency: new.currency,
            method: new.method,
            reference: new.reference,
            proof_url: new.proof_url,
            note: new.note,
            status: TopupStatus::Pending,
            admin_note: None,
            decided_by: None,
            created_at,
            decided_at: None,
        }
    }
}

/// Terminal status write, applied only while the request is still pending
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionRecord {
    pub decision: Decision,
    pub admin_id: UserId,
    pub admin_note: Option<String>,
    pub decided_at: DateTime<Utc>,
}
