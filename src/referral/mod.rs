//! One-time referral bonus
//!
//! Runs inside the unit of work that approves a topup. The referrer row is
//! locked before anything is counted, so two approvals for users sharing a
//! referrer evaluate one after the other and the second one sees the
//! first one's approved request. The flag flip and the bonus posting share
//! the unit: they commit together or not at all.

use rust_decimal::Decimal;

use crate::config::ReferralConfig;
use crate::core_types::{Currency, UserId};
use crate::error::LedgerError;
use crate::ledger::{Direction, EntryType, LedgerEntry, Posting};
use crate::store::UnitOfWork;

/// Qualification rule and payout
#[derive(Debug, Clone, PartialEq)]
pub struct ReferralPolicy {
    pub milestone: u64,
    pub bonus: Decimal,
    pub min_amount: Decimal,
    pub currency: Currency,
}

impl Default for ReferralPolicy {
    fn default() -> Self {
        ReferralConfig::default().into()
    }
}

impl From<ReferralConfig> for ReferralPolicy {
    fn from(cfg: ReferralConfig) -> Self {
        Self {
            milestone: cfg.milestone,
            bonus: cfg.bonus_htg,
            min_amount: cfg.min_topup_htg,
            currency: Currency::Htg,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReferralRewardEngine {
    policy: ReferralPolicy,
}

impl ReferralRewardEngine {
    pub fn new(policy: ReferralPolicy) -> Self {
        Self { policy }
    }

    /// Pay the referrer of `referred_user` if the milestone is now reached.
    ///
    /// Returns the bonus entry when one was posted in `uow`. Safe to call
    /// any number of times: a referrer is paid at most once.
    pub async fn evaluate(
        &self,
        uow: &mut dyn UnitOfWork,
        referred_user: UserId,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        let Some(referrer_id) = uow
            .get_user(referred_user)
            .await?
            .and_then(|u| u.referred_by_user_id)
        else {
            return Ok(None);
        };

        let Some(referrer) = uow.lock_user(referrer_id).await? else {
            return Ok(None);
        };
        if referrer.referral_bonus_paid {
            return Ok(None);
        }

        let qualified = uow
            .count_qualified_referrals(referrer_id, self.policy.currency, self.policy.min_amount)
            .await?;
        if qualified < self.policy.milestone {
            tracing::debug!(referrer_id, qualified, "Referral milestone not reached");
            return Ok(None);
        }

        if !uow.mark_referral_bonus_paid_if_unpaid(referrer_id).await? {
            return Ok(None);
        }

        let entry = uow
            .post(Posting::credit(
                referrer_id,
                EntryType::ReferralBonus,
                Direction::ReferralBonus,
                self.policy.currency,
                self.policy.bonus,
                format!("referral milestone {} reached", self.policy.milestone),
            )?)
            .await?;

        tracing::info!(
            referrer_id,
            triggered_by = referred_user,
            qualified,
            bonus = %self.policy.bonus,
            "Referral bonus posted"
        );
        Ok(Some(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::NewUser;
    use crate::fee;
    use crate::store::{LedgerStore, MemoryStore};
    use crate::topup::{Decision, DecisionRecord, NewTopupRequest, PaymentMethod};
    use chrono::Utc;

    async fn approve(uow: &mut dyn UnitOfWork, user_id: UserId, amount: i64, currency: Currency) {
        let amount = Decimal::from(amount);
        let req = uow
            .insert_topup(NewTopupRequest {
                user_id,
                amount,
                fee_amount: fee::fee(amount),
                net_amount: fee::net(amount),
                currency,
                method: PaymentMethod::Moncash,
                reference: format!("ref-{}", user_id),
                proof_url: None,
                note: None,
            })
            .await
            .unwrap();
        let decision = DecisionRecord {
            decision: Decision::Approved,
            admin_id: 1,
            admin_note: None,
            decided_at: Utc::now(),
        };
        assert!(uow.decide_topup_if_pending(req.id, &decision).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_no_referrer_is_noop() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let u = uow.insert_user(&NewUser::new("solo@w.ht")).await.unwrap();
        let engine = ReferralRewardEngine::default();
        assert!(engine.evaluate(uow.as_mut(), u.user_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_only_large_htg_topups_qualify() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let r = uow.insert_user(&NewUser::new("r@w.ht")).await.unwrap();
        let engine = ReferralRewardEngine::default();

        let mut last = 0;
        for (i, (amount, currency)) in [
            (250, Currency::Htg),
            (249, Currency::Htg),
            (1000, Currency::Usd),
            (300, Currency::Htg),
        ]
        .into_iter()
        .enumerate()
        {
            let u = uow
                .insert_user(&NewUser::new(format!("f{}@w.ht", i)).referred_by(r.user_id))
                .await
                .unwrap();
            approve(uow.as_mut(), u.user_id, amount, currency).await;
            last = u.user_id;
        }
        // two qualified so far
        assert!(engine.evaluate(uow.as_mut(), last).await.unwrap().is_none());

        let third = uow
            .insert_user(&NewUser::new("f9@w.ht").referred_by(r.user_id))
            .await
            .unwrap();
        approve(uow.as_mut(), third.user_id, 500, Currency::Htg).await;
        let bonus = engine.evaluate(uow.as_mut(), third.user_id).await.unwrap().unwrap();
        assert_eq!(bonus.user_id, r.user_id);
        assert_eq!(bonus.amount, Decimal::from(500));
        assert_eq!(bonus.direction, Direction::ReferralBonus);

        // re-evaluation pays nothing
        assert!(engine.evaluate(uow.as_mut(), third.user_id).await.unwrap().is_none());
        assert_eq!(uow.lock_wallet(r.user_id).await.unwrap().htg, Decimal::from(500));
    }

    #[test]
    fn test_policy_from_config() {
        let policy = ReferralPolicy::default();
        assert_eq!(policy.milestone, 3);
        assert_eq!(policy.bonus, Decimal::from(500));
        assert_eq!(policy.min_amount, Decimal::from(250));
        assert_eq!(policy.currency, Currency::Htg);
    }
}
