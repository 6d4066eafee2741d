//! Data models for the user reference table

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core_types::{Principal, Role, UserId, UserStatus};

/// User account as seen by the ledger core.
///
/// Identity, credentials and profile data live in the auth layer; the core
/// only needs role, status and the referral back-reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: UserId,
    pub email: String,
    pub role: Role,
    pub status: UserStatus,
    /// Referrer (pure lookup, no lifecycle coupling)
    pub referred_by_user_id: Option<UserId>,
    /// Set once this user's referral bonus has been paid out
    pub referral_bonus_paid: bool,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn principal(&self) -> Principal {
        Principal::new(self.user_id, self.role, self.status)
    }
}

/// Registration input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub role: Role,
    pub referred_by_user_id: Option<UserId>,
}

impl NewUser {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            role: Role::User,
            referred_by_user_id: None,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn referred_by(mut self, referrer: UserId) -> Self {
        self.referred_by_user_id = Some(referrer);
        self
    }
}

/// Canonical email form used for lookups
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn test_new_user_builder() {
        let u = NewUser::new("a@b.c").with_role(Role::Admin).referred_by(9);
        assert_eq!(u.role, Role::Admin);
        assert_eq!(u.referred_by_user_id, Some(9));
    }
}
