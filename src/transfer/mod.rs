//! Peer-to-peer transfers
//!
//! One unit of work: both wallets are locked in ascending user-id order,
//! the sender is debited, the recipient credited. A failed debit leaves
//! no trace on either side.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core_types::{Currency, Principal, UserId};
use crate::error::LedgerError;
use crate::ledger::{self, Direction, EntryType, LedgerEntry, Posting};
use crate::money::require_positive;
use crate::store::LedgerStore;

/// Both halves of a committed transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub currency: Currency,
    pub amount: Decimal,
    pub out_entry: LedgerEntry,
    pub in_entry: LedgerEntry,
    /// Sender balance after the transfer
    pub from_balance: Decimal,
}

#[derive(Clone)]
pub struct TransferService {
    store: Arc<dyn LedgerStore>,
}

impl TransferService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn transfer(
        &self,
        sender: &Principal,
        to_email: &str,
        currency: Currency,
        amount: Decimal,
        note: &str,
    ) -> Result<TransferReceipt, LedgerError> {
        sender.require_active()?;
        let amount = require_positive(amount)?;
        let note = note.trim().to_string();

        let mut uow = self.store.begin().await?;
        let recipient = uow
            .find_user_by_email(to_email)
            .await?
            .ok_or_else(|| LedgerError::RecipientNotFound(to_email.trim().to_string()))?;
        if recipient.user_id == sender.user_id {
            return Err(LedgerError::SelfTransferForbidden);
        }

        let (first, second) = if sender.user_id < recipient.user_id {
            (sender.user_id, recipient.user_id)
        } else {
            (recipient.user_id, sender.user_id)
        };
        uow.lock_wallet(first).await?;
        uow.lock_wallet(second).await?;

        let out_entry = uow
            .post(Posting::debit(
                sender.user_id,
                EntryType::Transfer,
                Direction::TransferOut,
                currency,
                amount,
                note.clone(),
            )?)
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    from = sender.user_id,
                    to = recipient.user_id,
                    %currency,
                    %amount,
                    "Transfer rejected: {}",
                    e
                )
            })?;
        let in_entry = uow
            .post(Posting::credit(
                recipient.user_id,
                EntryType::Transfer,
                Direction::TransferIn,
                currency,
                amount,
                note,
            )?)
            .await?;
        let from_balance = uow.lock_wallet(sender.user_id).await?.balance(currency);
        uow.commit().await?;

        ledger::log_committed(&[&out_entry, &in_entry]);
        tracing::info!(
            from = sender.user_id,
            to = recipient.user_id,
            %currency,
            %amount,
            "Transfer completed"
        );

        Ok(TransferReceipt {
            from_user_id: sender.user_id,
            to_user_id: recipient.user_id,
            currency,
            amount,
            out_entry,
            in_entry,
            from_balance,
        })
    }
}
