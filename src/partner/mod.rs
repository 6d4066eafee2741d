//! Partner merchants
//!
//! Admins register partners and toggle them; users spend wallet credit at
//! active partners, recorded as one `partner_spend` debit.

pub mod models;
pub mod service;

pub use models::{NewPartner, Partner};
pub use service::PartnerService;
