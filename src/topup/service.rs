use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::types::{
    Decision, DecisionRecord, NewTopupRequest, TopupInput, TopupRequest, TopupStatus,
};
use crate::core_types::{Principal, Role, TopupId, UserId};
use crate::error::LedgerError;
use crate::fee;
use crate::ledger::{self, Direction, EntryType, LedgerEntry, Posting};
use crate::money::require_positive;
use crate::referral::ReferralRewardEngine;
use crate::store::LedgerStore;

/// Maximum length of the user-supplied payment reference
pub const MAX_REFERENCE_LEN: usize = 120;

/// Everything a decision committed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub request: TopupRequest,
    /// `manual_topup` credit of the net amount (approvals only)
    pub credit_entry: Option<LedgerEntry>,
    /// Fee audit record (approvals with a non-zero fee)
    pub fee_entry: Option<LedgerEntry>,
    /// Bonus paid to the requester's referrer, if this approval reached the milestone
    pub referral_bonus: Option<LedgerEntry>,
}

#[derive(Clone)]
pub struct TopupWorkflow {
    store: Arc<dyn LedgerStore>,
    referral: ReferralRewardEngine,
}

impl TopupWorkflow {
    pub fn new(store: Arc<dyn LedgerStore>, referral: ReferralRewardEngine) -> Self {
        Self { store, referral }
    }

    /// Submit a PENDING request. Fee and net are fixed now, from the fee schedule.
    pub async fn create_request(
        &self,
        user: &Principal,
        input: TopupInput,
    ) -> Result<TopupRequest, LedgerError> {
        user.require_active()?;
        let amount = require_positive(input.amount)?;
        let fee_amount = fee::fee(amount);
        if !fee::is_payable(amount) {
            return Err(LedgerError::InvalidAmount(format!(
                "topup of {} does not cover the {} fee",
                amount, fee_amount
            )));
        }

        let reference = input.reference.trim().to_string();
        if reference.is_empty() || reference.chars().count() > MAX_REFERENCE_LEN {
            return Err(LedgerError::InvalidRequest(format!(
                "reference must be 1-{} characters",
                MAX_REFERENCE_LEN
            )));
        }

        let new = NewTopupRequest {
            user_id: user.user_id,
            amount,
            fee_amount,
            net_amount: fee::net(amount),
            currency: input.currency,
            method: input.method,
            reference,
            proof_url: non_empty(input.proof_url),
            note: non_empty(input.note),
        };

        let mut uow = self.store.begin().await?;
        let request = uow.insert_topup(new).await?;
        uow.commit().await?;

        tracing::info!(
            request_id = request.id,
            user_id = request.user_id,
            amount = %request.amount,
            fee = %request.fee_amount,
            currency = %request.currency,
            method = %request.method,
            "Topup request created"
        );
        Ok(request)
    }

    /// The caller's requests, newest first
    pub async fn list_mine(&self, user_id: UserId) -> Result<Vec<TopupRequest>, LedgerError> {
        self.store.list_topups_by_user(user_id).await
    }

    /// PENDING requests, oldest first
    pub async fn list_pending(&self, admin: &Principal) -> Result<Vec<TopupRequest>, LedgerError> {
        admin.require_admin()?;
        self.store.list_topups_by_status(TopupStatus::Pending).await
    }

    /// Move a PENDING request to its terminal state.
    ///
    /// A plain admin may not decide their own request; a superadmin may.
    /// Approval credits the net amount, records the fee and runs the
    /// referral engine, all in the unit that flips the status.
    pub async fn decide(
        &self,
        admin: &Principal,
        request_id: TopupId,
        decision: Decision,
        admin_note: Option<String>,
    ) -> Result<DecisionOutcome, LedgerError> {
        admin.require_admin()?;

        let mut uow = self.store.begin().await?;
        let current = uow
            .get_topup(request_id)
            .await?
            .ok_or(LedgerError::RequestNotFound(request_id))?;
        if admin.role == Role::Admin && current.user_id == admin.user_id {
            tracing::warn!(request_id, admin_id = admin.user_id, "Self-approval refused");
            return Err(LedgerError::SelfApprovalForbidden);
        }

        let record = DecisionRecord {
            decision,
            admin_id: admin.user_id,
            admin_note: non_empty(admin_note),
            decided_at: Utc::now(),
        };
        let Some(request) = uow.decide_topup_if_pending(request_id, &record).await? else {
            tracing::warn!(
                request_id,
                admin_id = admin.user_id,
                status = %current.status,
                "Topup already decided"
            );
            return Err(LedgerError::AlreadyDecided(request_id));
        };

        let mut outcome = DecisionOutcome {
            request,
            credit_entry: None,
            fee_entry: None,
            referral_bonus: None,
        };

        if decision == Decision::Approved {
            let req = &outcome.request;
            let note = format!("topup #{} via {} ({})", req.id, req.method, req.reference);
            if req.net_amount > Decimal::ZERO {
                outcome.credit_entry = Some(
                    uow.post(Posting::credit(
                        req.user_id,
                        EntryType::Topup,
                        Direction::ManualTopup,
                        req.currency,
                        req.net_amount,
                        note.clone(),
                    )?)
                    .await?,
                );
            }
            if req.fee_amount > Decimal::ZERO {
                outcome.fee_entry = Some(
                    uow.post(Posting::fee_audit(
                        req.user_id,
                        req.currency,
                        req.fee_amount,
                        format!("fee on {}", note),
                    )?)
                    .await?,
                );
            }
            let requester = req.user_id;
            outcome.referral_bonus = self.referral.evaluate(uow.as_mut(), requester).await?;
        }

        uow.commit().await?;

        let committed: Vec<&LedgerEntry> = [
            &outcome.credit_entry,
            &outcome.fee_entry,
            &outcome.referral_bonus,
        ]
        .into_iter()
        .flatten()
        .collect();
        ledger::log_committed(&committed);
        tracing::info!(
            request_id,
            admin_id = admin.user_id,
            user_id = outcome.request.user_id,
            status = %outcome.request.status,
            "Topup decided"
        );
        Ok(outcome)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
