//! User registry
//!
//! Registration (user + zero wallet in one unit), lookup and the deletion
//! policy. Credentials and sessions belong to the auth layer.

pub mod models;
pub mod service;

pub use models::{NewUser, UserRecord, normalize_email};
pub use service::AccountService;
