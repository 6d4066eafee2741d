//! Wallet Ledger operator binary
//!
//! ```text
//! wallet_ledger [--env dev] [--init-schema] [--reconcile]
//! ```
//!
//! Loads `config/<env>.yaml`, connects to PostgreSQL (or falls back to the
//! in-memory store when no `postgres_url` is configured), optionally
//! applies the schema and runs a reconciliation sweep over every wallet.

use anyhow::Context;
use std::sync::Arc;

use wallet_ledger::config::AppConfig;
use wallet_ledger::db::Database;
use wallet_ledger::store::{LedgerStore, MemoryStore, PgLedgerStore, schema};
use wallet_ledger::WalletCore;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

fn has_flag(flag: &str) -> bool {
    std::env::args().any(|a| a == flag)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env)?;
    let _log_guard = wallet_ledger::logging::init_logging(&app_config);

    tracing::info!(
        "Starting wallet_ledger {} ({}) in {} mode",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env
    );

    let store: Arc<dyn LedgerStore> = match &app_config.postgres_url {
        Some(url) => {
            let db = Database::connect(url, app_config.max_connections)
                .await
                .context("Failed to connect to PostgreSQL")?;
            db.health_check().await.context("PostgreSQL health check failed")?;
            if has_flag("--init-schema") {
                schema::init_schema(db.pool())
                    .await
                    .context("Failed to initialize schema")?;
            }
            Arc::new(PgLedgerStore::new(&db))
        }
        None => {
            tracing::warn!("No postgres_url configured, using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };
    tracing::info!(backend = store.name(), "Ledger store ready");

    let core = WalletCore::from_config(store, &app_config);
    let fx = core.get_fx().await?;
    tracing::info!(sell_usd = %fx.sell_usd, buy_usd = %fx.buy_usd, "FX rates loaded");

    if has_flag("--reconcile") {
        let mismatches = core.reconcile_all().await?;
        if !mismatches.is_empty() {
            anyhow::bail!("{} wallet(s) do not match their ledger", mismatches.len());
        }
        tracing::info!("All wallets match their ledger");
    }

    Ok(())
}
