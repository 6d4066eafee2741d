//! Wallet balances
//!
//! Reads, generic credit/debit, admin adjustments and reconciliation.
//! Every mutation goes through `UnitOfWork::post`, so a balance never
//! moves without its ledger entry.

pub mod models;
pub mod service;

pub use models::{AdjustOutcome, ReconcileReport, Wallet};
pub use service::{EntrySpec, WalletService};
