//! Ledger Error Types
//!
//! Business-rule rejections and infrastructure failures for every
//! ledger-mutating and query operation.

use thiserror::Error;

use crate::core_types::{Currency, PartnerId, TopupId, UserId};

/// Ledger error types
///
/// Business-rule variants are final for the given input; infrastructure
/// variants (`Database`, `Internal`) are retryable by the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    // === Validation Errors ===
    #[error("Invalid currency: {0}")]
    InvalidCurrency(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid FX rate: {0}")]
    InvalidFxRate(String),

    #[error("Invalid decision: {0}")]
    InvalidDecision(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // === Balance Errors ===
    #[error("Insufficient {0} balance")]
    InsufficientBalance(Currency),

    #[error("Wallet not found for user {0}")]
    WalletNotFound(UserId),

    // === Transfer Errors ===
    #[error("Transfer to self is forbidden")]
    SelfTransferForbidden,

    #[error("Recipient not found: {0}")]
    RecipientNotFound(String),

    // === Topup Errors ===
    #[error("Topup request not found: {0}")]
    RequestNotFound(TopupId),

    #[error("Topup request {0} already decided")]
    AlreadyDecided(TopupId),

    #[error("An admin cannot decide their own topup request")]
    SelfApprovalForbidden,

    // === Account Errors ===
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("User already exists: {0}")]
    DuplicateUser(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Deletion forbidden: {0}")]
    DeletionForbidden(String),

    // === Partner Errors ===
    #[error("Partner {0} is inactive or not found")]
    PartnerInactiveOrNotFound(PartnerId),

    // === System Errors ===
    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal system error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Stable reason code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidCurrency(_) => "INVALID_CURRENCY",
            LedgerError::InvalidAmount(_) => "INVALID_AMOUNT",
            LedgerError::InvalidFxRate(_) => "INVALID_FX_RATE",
            LedgerError::InvalidDecision(_) => "INVALID_DECISION",
            LedgerError::InvalidRequest(_) => "INVALID_REQUEST",
            LedgerError::InsufficientBalance(_) => "INSUFFICIENT_BALANCE",
            LedgerError::WalletNotFound(_) => "WALLET_NOT_FOUND",
            LedgerError::SelfTransferForbidden => "SELF_TRANSFER_FORBIDDEN",
            LedgerError::RecipientNotFound(_) => "RECIPIENT_NOT_FOUND",
            LedgerError::RequestNotFound(_) => "REQUEST_NOT_FOUND",
            LedgerError::AlreadyDecided(_) => "ALREADY_DECIDED",
            LedgerError::SelfApprovalForbidden => "SELF_APPROVAL_FORBIDDEN",
            LedgerError::UserNotFound(_) => "USER_NOT_FOUND",
            LedgerError::DuplicateUser(_) => "DUPLICATE_USER",
            LedgerError::Forbidden(_) => "FORBIDDEN",
            LedgerError::DeletionForbidden(_) => "DELETION_FORBIDDEN",
            LedgerError::PartnerInactiveOrNotFound(_) => "PARTNER_INACTIVE_OR_NOT_FOUND",
            LedgerError::Database(_) => "DATABASE_ERROR",
            LedgerError::Internal(_) => "SYSTEM_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::InvalidCurrency(_)
            | LedgerError::InvalidAmount(_)
            | LedgerError::InvalidFxRate(_)
            | LedgerError::InvalidDecision(_)
            | LedgerError::InvalidRequest(_)
            | LedgerError::SelfTransferForbidden
            | LedgerError::AlreadyDecided(_) => 400,
            LedgerError::Forbidden(_)
            | LedgerError::SelfApprovalForbidden
            | LedgerError::DeletionForbidden(_) => 403,
            LedgerError::WalletNotFound(_)
            | LedgerError::RecipientNotFound(_)
            | LedgerError::RequestNotFound(_)
            | LedgerError::UserNotFound(_)
            | LedgerError::PartnerInactiveOrNotFound(_) => 404,
            LedgerError::DuplicateUser(_) => 409,
            LedgerError::InsufficientBalance(_) => 422,
            LedgerError::Database(_) => 503,
            LedgerError::Internal(_) => 500,
        }
    }

    /// Infrastructure failures may succeed on retry; business rejections never do.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Database(_) | LedgerError::Internal(_))
    }
}

/// PostgreSQL `numeric_value_out_of_range`
const PG_NUMERIC_OUT_OF_RANGE: &str = "22003";

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        // a value the column cannot hold is the caller's input, not an outage
        if let sqlx::Error::Database(db) = &e {
            if db.code().as_deref() == Some(PG_NUMERIC_OUT_OF_RANGE) {
                return LedgerError::InvalidAmount(db.message().to_string());
            }
        }
        LedgerError::Database(e.to_string())
    }
}

impl From<anyhow::Error> for LedgerError {
    fn from(e: anyhow::Error) -> Self {
        LedgerError::Internal(e.to_string())
    }
}
