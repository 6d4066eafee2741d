//! Partner merchants where wallet credit can be spent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core_types::PartnerId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partner {
    pub id: PartnerId,
    pub name: String,
    pub category: String,
    pub url: String,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPartner {
    pub name: String,
    #[serde(default = "default_category")]
    pub category: String,
    pub url: String,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_category() -> String {
    "autre".to_string()
}

fn default_active() -> bool {
    true
}

impl NewPartner {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: default_category(),
            url: url.into(),
            description: None,
            logo_url: None,
            active: true,
        }
    }
}
