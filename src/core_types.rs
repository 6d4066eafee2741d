//! Core types used throughout the system
//!
//! Identity, currency and role types shared by every ledger module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LedgerError;

/// User ID - primary key of the (external) users table.
///
/// Immutable after assignment; referenced by wallets, ledger entries,
/// topup requests and the referral back-reference.
pub type UserId = i64;

/// Ledger entry ID
pub type EntryId = i64;

/// Topup request ID
pub type TopupId = i64;

/// Partner ID
pub type PartnerId = i64;

/// Wallet currency.
///
/// Every wallet holds exactly one balance per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Htg,
    Usd,
}

impl Currency {
    pub const ALL: [Currency; 2] = [Currency::Htg, Currency::Usd];

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Htg => "htg",
            Currency::Usd => "usd",
        }
    }

    /// The other currency of the pair
    #[inline]
    pub fn counter(&self) -> Currency {
        match self {
            Currency::Htg => Currency::Usd,
            Currency::Usd => Currency::Htg,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "htg" => Ok(Currency::Htg),
            "usd" => Ok(Currency::Usd),
            other => Err(LedgerError::InvalidCurrency(other.to_string())),
        }
    }
}

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
    Superadmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Superadmin => "superadmin",
        }
    }

    /// `admin` or `superadmin`
    #[inline]
    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Admin | Role::Superadmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "superadmin" => Ok(Role::Superadmin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// User account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Suspended,
    Banned,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Suspended => "suspended",
            UserStatus::Banned => "banned",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(UserStatus::Active),
            "suspended" => Ok(UserStatus::Suspended),
            "banned" => Ok(UserStatus::Banned),
            _ => Err(format!("Invalid user status: {}", s)),
        }
    }
}

/// Authenticated caller, as handed over by the auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
    pub status: UserStatus,
}

impl Principal {
    pub fn new(user_id: UserId, role: Role, status: UserStatus) -> Self {
        Self {
            user_id,
            role,
            status,
        }
    }

    /// Caller must be an active account
    pub fn require_active(&self) -> Result<(), LedgerError> {
        if self.status != UserStatus::Active {
            return Err(LedgerError::Forbidden(format!(
                "account is {}",
                self.status
            )));
        }
        Ok(())
    }

    /// Caller must be an active admin or superadmin
    pub fn require_admin(&self) -> Result<(), LedgerError> {
        self.require_active()?;
        if !self.role.is_elevated() {
            return Err(LedgerError::Forbidden("admin role required".into()));
        }
        Ok(())
    }

    /// Caller must own `user_id`'s data or be an admin
    pub fn require_owner_or_admin(&self, user_id: UserId) -> Result<(), LedgerError> {
        self.require_active()?;
        if self.user_id != user_id && !self.role.is_elevated() {
            return Err(LedgerError::Forbidden(format!(
                "user {} cannot access user {}",
                self.user_id, user_id
            )));
        }
        Ok(())
    }

    /// Caller must be an active superadmin
    pub fn require_superadmin(&self) -> Result<(), LedgerError> {
        self.require_active()?;
        if self.role != Role::Superadmin {
            return Err(LedgerError::Forbidden("superadmin role required".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_from_str() {
        assert_eq!("htg".parse::<Currency>().unwrap(), Currency::Htg);
        assert_eq!(" USD ".parse::<Currency>().unwrap(), Currency::Usd);
        assert!(matches!(
            "eur".parse::<Currency>(),
            Err(LedgerError::InvalidCurrency(c)) if c == "eur"
        ));
    }

    #[test]
    fn test_currency_counter() {
        assert_eq!(Currency::Htg.counter(), Currency::Usd);
        assert_eq!(Currency::Usd.counter(), Currency::Htg);
    }

    #[test]
    fn test_principal_guards() {
        let admin = Principal::new(1, Role::Admin, UserStatus::Active);
        assert!(admin.require_admin().is_ok());
        assert!(admin.require_superadmin().is_err());

        let banned = Principal::new(2, Role::Superadmin, UserStatus::Banned);
        assert!(banned.require_active().is_err());
        assert!(banned.require_admin().is_err());

        let user = Principal::new(3, Role::User, UserStatus::Active);
        assert!(matches!(
            user.require_admin(),
            Err(LedgerError::Forbidden(_))
        ));
    }
}
