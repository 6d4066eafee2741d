//! PostgreSQL schema for the ledger core
//!
//! Balances and amounts are NUMERIC(20,2); rates NUMERIC(20,6).
//! Non-negative balances are enforced twice: by the guarded UPDATE in
//! `post` and by CHECK constraints here.

use sqlx::PgPool;

use crate::error::LedgerError;

pub const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id                   BIGSERIAL PRIMARY KEY,
    email                TEXT NOT NULL UNIQUE,
    role                 TEXT NOT NULL DEFAULT 'user'
                         CHECK (role IN ('user', 'admin', 'superadmin')),
    status               TEXT NOT NULL DEFAULT 'active'
                         CHECK (status IN ('active', 'suspended', 'banned')),
    referred_by_user_id  BIGINT REFERENCES users(id) ON DELETE SET NULL,
    referral_bonus_paid  BOOLEAN NOT NULL DEFAULT FALSE,
    created_at           TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_USERS_REFERRER_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_users_referred_by ON users (referred_by_user_id)
"#;

pub const CREATE_WALLETS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS wallets (
    user_id     BIGINT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    htg         NUMERIC(20, 2) NOT NULL DEFAULT 0 CHECK (htg >= 0),
    usd         NUMERIC(20, 2) NOT NULL DEFAULT 0 CHECK (usd >= 0),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_TRANSACTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transactions (
    id              BIGSERIAL PRIMARY KEY,
    user_id         BIGINT NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
    type            TEXT NOT NULL,
    currency        TEXT NOT NULL CHECK (currency IN ('htg', 'usd')),
    amount          NUMERIC(20, 2) NOT NULL CHECK (amount > 0),
    direction       TEXT NOT NULL,
    counter_amount  NUMERIC(20, 2),
    rate_used       NUMERIC(20, 6),
    note            TEXT NOT NULL DEFAULT '',
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_TRANSACTIONS_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_transactions_user_created
    ON transactions (user_id, created_at DESC, id DESC);
CREATE INDEX IF NOT EXISTS idx_transactions_type_created
    ON transactions (type, created_at)
"#;

pub const CREATE_TOPUP_REQUESTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS topup_requests (
    id          BIGSERIAL PRIMARY KEY,
    user_id     BIGINT NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
    amount      NUMERIC(20, 2) NOT NULL CHECK (amount > 0),
    fee_amount  NUMERIC(20, 2) NOT NULL CHECK (fee_amount >= 0),
    net_amount  NUMERIC(20, 2) NOT NULL CHECK (net_amount >= 0),
    currency    TEXT NOT NULL CHECK (currency IN ('htg', 'usd')),
    method      TEXT NOT NULL,
    reference   TEXT NOT NULL,
    proof_url   TEXT,
    note        TEXT,
    status      TEXT NOT NULL DEFAULT 'PENDING'
                CHECK (status IN ('PENDING', 'APPROVED', 'REJECTED')),
    admin_note  TEXT,
    decided_by  BIGINT REFERENCES users(id) ON DELETE SET NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    decided_at  TIMESTAMPTZ
)
"#;

pub const CREATE_TOPUP_REQUESTS_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_topup_requests_user ON topup_requests (user_id, id DESC);
CREATE INDEX IF NOT EXISTS idx_topup_requests_status ON topup_requests (status, id)
"#;

pub const CREATE_FX_SETTINGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS fx_settings (
    id          SMALLINT PRIMARY KEY DEFAULT 1 CHECK (id = 1),
    sell_usd    NUMERIC(20, 6) NOT NULL CHECK (sell_usd > 0),
    buy_usd     NUMERIC(20, 6) NOT NULL CHECK (buy_usd > 0),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_PARTNERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS partners (
    id           BIGSERIAL PRIMARY KEY,
    name         VARCHAR(120) NOT NULL,
    category     VARCHAR(60) NOT NULL DEFAULT 'autre',
    url          VARCHAR(300) NOT NULL,
    description  TEXT,
    logo_url     VARCHAR(300),
    active       BOOLEAN NOT NULL DEFAULT TRUE,
    created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at   TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// Statements in dependency order
pub const SCHEMA: [(&str, &str); 9] = [
    ("users", CREATE_USERS_TABLE),
    ("users referrer index", CREATE_USERS_REFERRER_INDEX),
    ("wallets", CREATE_WALLETS_TABLE),
    ("transactions", CREATE_TRANSACTIONS_TABLE),
    ("transactions indexes", CREATE_TRANSACTIONS_INDEXES),
    ("topup_requests", CREATE_TOPUP_REQUESTS_TABLE),
    ("topup_requests indexes", CREATE_TOPUP_REQUESTS_INDEXES),
    ("fx_settings", CREATE_FX_SETTINGS_TABLE),
    ("partners", CREATE_PARTNERS_TABLE),
];

/// Create all tables and indexes (idempotent)
pub async fn init_schema(pool: &PgPool) -> Result<(), LedgerError> {
    tracing::info!("Initializing ledger schema...");
    for (name, ddl) in SCHEMA {
        sqlx::raw_sql(ddl).execute(pool).await.map_err(|e| {
            tracing::error!("Failed to create {}: {}", name, e);
            LedgerError::from(e)
        })?;
    }
    tracing::info!("Ledger schema ready");
    Ok(())
}
