//! Wallet Ledger - accounting core of a custodial HTG/USD wallet
//!
//! Per-user balances in two currencies, an immutable ledger behind every
//! balance change, a human-approved topup workflow and a one-time referral
//! bonus.
//!
//! # Modules
//!
//! - [`core_types`] - Ids, currencies, roles, principals
//! - [`money`] - 2-decimal amount discipline
//! - [`fee`] - Tiered topup fee schedule
//! - [`fx`] - Sell/buy rate pair and conversion arithmetic
//! - [`ledger`] - Ledger entries, postings, reconciliation
//! - [`store`] - `LedgerStore` / `UnitOfWork` with memory and PostgreSQL backends
//! - [`wallet`] - Balances, admin adjustments
//! - [`transfer`] - Peer-to-peer transfers
//! - [`convert`] - HTG <-> USD conversion
//! - [`topup`] - Manual topup workflow
//! - [`referral`] - Referral bonus engine
//! - [`partner`] - Partner merchants and partner spend
//! - [`stats`] - Fee and activity totals
//! - [`rate_limit`] - Login attempt limiter for the auth layer
//! - [`service`] - `WalletCore` facade

// Core types - must be first!
pub mod core_types;
pub mod error;

// Money arithmetic
pub mod fee;
pub mod fx;
pub mod money;

// Ledger & persistence
pub mod db;
pub mod ledger;
pub mod store;

// Domain services
pub mod account;
pub mod convert;
pub mod partner;
pub mod referral;
pub mod stats;
pub mod topup;
pub mod transfer;
pub mod wallet;

pub mod rate_limit;
pub mod service;

// Ambient
pub mod config;
pub mod logging;

// Convenient re-exports at crate root
pub use core_types::{Currency, EntryId, PartnerId, Principal, Role, TopupId, UserId, UserStatus};
pub use error::LedgerError;
pub use fx::{ConversionDirection, FxSetting};
pub use ledger::{Balances, Direction, EntryType, LedgerEntry, Posting, TxFilter};
pub use service::WalletCore;
pub use store::{LedgerStore, MemoryStore, PgLedgerStore, UnitOfWork};
pub use topup::{Decision, TopupRequest, TopupStatus};
pub use wallet::Wallet;
