use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_log_file")]
    pub log_file: String,
    #[serde(default)]
    pub use_json: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String,
    /// Per-mutation audit lines (target `ledger_audit`)
    #[serde(default = "default_true")]
    pub audit_log: bool,
    /// PostgreSQL connection URL; absent means the in-memory store
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default)]
    pub referral: ReferralConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "./logs".to_string()
}

fn default_log_file() -> String {
    "wallet_ledger.log".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_connections() -> u32 {
    20
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: default_log_dir(),
            log_file: default_log_file(),
            use_json: false,
            rotation: default_rotation(),
            audit_log: true,
            postgres_url: None,
            max_connections: default_max_connections(),
            referral: ReferralConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// One-time referral bonus policy
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReferralConfig {
    /// Distinct qualified referred users needed
    pub milestone: u64,
    /// Bonus credited in HTG
    pub bonus_htg: Decimal,
    /// Minimum approved HTG topup for a referred user to qualify
    pub min_topup_htg: Decimal,
}

impl Default for ReferralConfig {
    fn default() -> Self {
        Self {
            milestone: 3,
            bonus_htg: Decimal::from(500),
            min_topup_htg: Decimal::from(250),
        }
    }
}

/// Login attempt limiter
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RateLimitConfig {
    pub max_attempts: u32,
    pub block_minutes: i64,
    /// Failed attempts older than this no longer count
    #[serde(default = "default_window_minutes")]
    pub window_minutes: i64,
}

fn default_window_minutes() -> i64 {
    15
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            block_minutes: 10,
            window_minutes: default_window_minutes(),
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", config_path))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_sections_fall_back_to_defaults() {
        let config = AppConfig::from_yaml("log_level: debug\n").unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.postgres_url, None);
        assert_eq!(config.referral, ReferralConfig::default());
        assert_eq!(config.rate_limit.max_attempts, 5);
        assert!(config.audit_log);
    }

    #[test]
    fn test_referral_override() {
        let yaml = r#"
referral:
  milestone: 5
  bonus_htg: 750
  min_topup_htg: 300.50
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.referral.milestone, 5);
        assert_eq!(config.referral.bonus_htg, Decimal::from(750));
        assert_eq!(config.referral.min_topup_htg, Decimal::new(30050, 2));
    }

    #[test]
    fn test_rate_limit_window_defaults_when_omitted() {
        let yaml = "rate_limit:\n  max_attempts: 3\n  block_minutes: 30\n";
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.rate_limit.max_attempts, 3);
        assert_eq!(config.rate_limit.window_minutes, 15);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        assert!(AppConfig::load("no_such_env").is_err());
    }

    #[test]
    fn test_dev_config_parses() {
        let config = AppConfig::load("dev").unwrap();
        assert_eq!(config.referral.milestone, 3);
    }
}
