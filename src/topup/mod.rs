//! Manual topup workflow
//!
//! ```text
//! PENDING ──approve──▶ APPROVED   (net credited, fee audited, referral evaluated)
//!    │
//!    └─────reject────▶ REJECTED   (no balance effect)
//! ```
//!
//! A request leaves PENDING exactly once; the status check and the status
//! write are one compare-and-swap.

pub mod service;
pub mod types;

pub use service::{DecisionOutcome, TopupWorkflow};
pub use types::{
    Decision, DecisionRecord, NewTopupRequest, PaymentMethod, TopupInput, TopupRequest,
    TopupStatus,
};
