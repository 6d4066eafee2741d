//! PostgreSQL ledger store
//!
//! Each unit of work is one database transaction (READ COMMITTED).
//! Isolation comes from row locks and guarded updates:
//!
//! - `post` applies deltas with a single `UPDATE ... WHERE balance + delta >= 0`,
//!   so two concurrent debits can never both pass the funds check
//! - topup decisions and the referral flag are compare-and-swap updates
//! - `lock_wallet` takes a `FOR UPDATE` row lock, `lock_user` a `FOR NO KEY UPDATE` one

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Transaction};

use super::{LedgerStore, UnitOfWork, finished_unit};
use crate::account::{NewUser, UserRecord, normalize_email};
use crate::core_types::{Currency, PartnerId, TopupId, UserId};
use crate::db::{Database, LedgerRow};
use crate::error::LedgerError;
use crate::fx::FxSetting;
use crate::ledger::{Balances, EntryType, LedgerEntry, Posting, TxFilter};
use crate::partner::{NewPartner, Partner};
use crate::topup::{DecisionRecord, NewTopupRequest, TopupRequest, TopupStatus};
use crate::wallet::Wallet;

const USER_COLUMNS: &str =
    "id, email, role, status, referred_by_user_id, referral_bonus_paid, created_at";

const WALLET_COLUMNS: &str = "user_id, htg, usd, updated_at";

const ENTRY_COLUMNS: &str =
    "id, user_id, type, currency, amount, direction, counter_amount, rate_used, note, created_at";

const TOPUP_COLUMNS: &str = "id, user_id, amount, fee_amount, net_amount, currency, method, \
     reference, proof_url, note, status, admin_note, decided_by, created_at, decided_at";

const PARTNER_COLUMNS: &str =
    "id, name, category, url, description, logo_url, active, created_at, updated_at";

fn user_from_row(row: &PgRow) -> Result<UserRecord, LedgerError> {
    Ok(UserRecord {
        user_id: row.col("id")?,
        email: row.col("email")?,
        role: row.parsed("role")?,
        status: row.parsed("status")?,
        referred_by_user_id: row.col("referred_by_user_id")?,
        referral_bonus_paid: row.col("referral_bonus_paid")?,
        created_at: row.col("created_at")?,
    })
}

fn wallet_from_row(row: &PgRow) -> Result<Wallet, LedgerError> {
    Ok(Wallet {
        user_id: row.col("user_id")?,
        htg: row.col("htg")?,
        usd: row.col("usd")?,
        updated_at: row.col("updated_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> Result<LedgerEntry, LedgerError> {
    Ok(LedgerEntry {
        id: row.col("id")?,
        user_id: row.col("user_id")?,
        entry_type: row.parsed("type")?,
        currency: row.parsed("currency")?,
        amount: row.col("amount")?,
        direction: row.parsed("direction")?,
        counter_amount: row.col("counter_amount")?,
        rate_used: row.col("rate_used")?,
        note: row.col("note")?,
        created_at: row.col("created_at")?,
    })
}

fn topup_from_row(row: &PgRow) -> Result<TopupRequest, LedgerError> {
    Ok(TopupRequest {
        id: row.col("id")?,
        user_id: row.col("user_id")?,
        amount: row.col("amount")?,
        fee_amount: row.col("fee_amount")?,
        net_amount: row.col("net_amount")?,
        currency: row.parsed("currency")?,
        method: row.parsed("method")?,
        reference: row.col("reference")?,
        proof_url: row.col("proof_url")?,
        note: row.col("note")?,
        status: row.parsed("status")?,
        admin_note: row.col("admin_note")?,
        decided_by: row.col("decided_by")?,
        created_at: row.col("created_at")?,
        decided_at: row.col("decided_at")?,
    })
}

fn partner_from_row(row: &PgRow) -> Result<Partner, LedgerError> {
    Ok(Partner {
        id: row.col("id")?,
        name: row.col("name")?,
        category: row.col("category")?,
        url: row.col("url")?,
        description: row.col("description")?,
        logo_url: row.col("logo_url")?,
        active: row.col("active")?,
        created_at: row.col("created_at")?,
        updated_at: row.col("updated_at")?,
    })
}

fn fx_from_row(row: &PgRow) -> Result<FxSetting, LedgerError> {
    Ok(FxSetting {
        sell_usd: row.col("sell_usd")?,
        buy_usd: row.col("buy_usd")?,
        updated_at: row.col("updated_at")?,
    })
}

fn collect<T>(
    rows: Vec<PgRow>,
    map: fn(&PgRow) -> Result<T, LedgerError>,
) -> Result<Vec<T>, LedgerError> {
    rows.iter().map(map).collect()
}

/// PostgreSQL-backed ledger store
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, LedgerError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnit { tx: Some(tx) }))
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<UserRecord>, LedgerError> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn get_wallet(&self, user_id: UserId) -> Result<Option<Wallet>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM wallets WHERE user_id = $1",
            WALLET_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(wallet_from_row).transpose()
    }

    async fn wallet_user_ids(&self) -> Result<Vec<UserId>, LedgerError> {
        let rows = sqlx::query("SELECT user_id FROM wallets ORDER BY user_id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|r| r.col("user_id")).collect()
    }

    async fn list_entries(
        &self,
        user_id: UserId,
        filter: &TxFilter,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM transactions WHERE user_id = ",
            ENTRY_COLUMNS
        ));
        qb.push_bind(user_id);
        if let Some(entry_type) = filter.entry_type {
            qb.push(" AND type = ").push_bind(entry_type.as_str());
        }
        if let Some(currency) = filter.currency {
            // Conversions touch both currencies
            qb.push(" AND (currency = ")
                .push_bind(currency.as_str())
                .push(" OR direction IN ('htg_to_usd', 'usd_to_htg'))");
        }
        if let Some(direction) = filter.direction {
            qb.push(" AND direction = ").push_bind(direction.as_str());
        }
        if let Some(since) = filter.since {
            qb.push(" AND created_at >= ").push_bind(since);
        }
        if let Some(until) = filter.until {
            qb.push(" AND created_at < ").push_bind(until);
        }
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(filter.effective_limit() as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;
        collect(rows, entry_from_row)
    }

    async fn all_entries(&self, user_id: UserId) -> Result<Vec<LedgerEntry>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE user_id = $1 ORDER BY id",
            ENTRY_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        collect(rows, entry_from_row)
    }

    async fn sum_entries(
        &self,
        entry_type: EntryType,
        since: Option<DateTime<Utc>>,
    ) -> Result<Balances, LedgerError> {
        let rows = sqlx::query(
            r#"SELECT currency, COALESCE(SUM(amount), 0) AS total
               FROM transactions
               WHERE type = $1 AND ($2::timestamptz IS NULL OR created_at >= $2)
               GROUP BY currency"#,
        )
        .bind(entry_type.as_str())
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let mut totals = Balances::default();
        for row in &rows {
            let currency: Currency = row.parsed("currency")?;
            let total: Decimal = row.col("total")?;
            totals.add(currency, total);
        }
        Ok(totals)
    }

    async fn get_topup(&self, id: TopupId) -> Result<Option<TopupRequest>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM topup_requests WHERE id = $1",
            TOPUP_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(topup_from_row).transpose()
    }

    async fn list_topups_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<TopupRequest>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM topup_requests WHERE user_id = $1 ORDER BY id DESC",
            TOPUP_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        collect(rows, topup_from_row)
    }

    async fn list_topups_by_status(
        &self,
        status: TopupStatus,
    ) -> Result<Vec<TopupRequest>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM topup_requests WHERE status = $1 ORDER BY id",
            TOPUP_COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        collect(rows, topup_from_row)
    }

    async fn get_partner(&self, id: PartnerId) -> Result<Option<Partner>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM partners WHERE id = $1",
            PARTNER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(partner_from_row).transpose()
    }

    async fn list_partners(&self, active_only: bool) -> Result<Vec<Partner>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM partners WHERE ($1 = FALSE OR active) ORDER BY id DESC",
            PARTNER_COLUMNS
        ))
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        collect(rows, partner_from_row)
    }
}

/// One database transaction. Dropping it without `commit` rolls back.
pub struct PgUnit {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgUnit {
    fn conn(&mut self) -> Result<&mut PgConnection, LedgerError> {
        self.tx.as_deref_mut().ok_or_else(finished_unit)
    }
}

#[async_trait]
impl UnitOfWork for PgUnit {
    async fn get_user(&mut self, user_id: UserId) -> Result<Option<UserRecord>, LedgerError> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(self.conn()?)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn lock_user(&mut self, user_id: UserId) -> Result<Option<UserRecord>, LedgerError> {
        // NO KEY UPDATE leaves the FK key-share lock of a concurrent
        // `INSERT INTO transactions` for this user free to proceed
        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE id = $1 FOR NO KEY UPDATE",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(self.conn()?)
        .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_email(
        &mut self,
        email: &str,
    ) -> Result<Option<UserRecord>, LedgerError> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS))
            .bind(normalize_email(email))
            .fetch_optional(self.conn()?)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn insert_user(&mut self, new: &NewUser) -> Result<UserRecord, LedgerError> {
        let email = normalize_email(&new.email);
        if let Some(referrer) = new.referred_by_user_id {
            let exists = sqlx::query("SELECT 1 FROM users WHERE id = $1")
                .bind(referrer)
                .fetch_optional(self.conn()?)
                .await?;
            if exists.is_none() {
                return Err(LedgerError::UserNotFound(referrer));
            }
        }

        let row = sqlx::query(&format!(
            "INSERT INTO users (email, role, referred_by_user_id) VALUES ($1, $2, $3) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&email)
        .bind(new.role.as_str())
        .bind(new.referred_by_user_id)
        .fetch_one(self.conn()?)
        .await
        .map_err(|e| {
            if e.as_database_error().is_some_and(|d| d.is_unique_violation()) {
                LedgerError::DuplicateUser(email.clone())
            } else {
                LedgerError::from(e)
            }
        })?;
        let record = user_from_row(&row)?;

        sqlx::query("INSERT INTO wallets (user_id) VALUES ($1)")
            .bind(record.user_id)
            .execute(self.conn()?)
            .await?;
        Ok(record)
    }

    async fn has_history(&mut self, user_id: UserId) -> Result<bool, LedgerError> {
        let row = sqlx::query(
            r#"SELECT EXISTS (SELECT 1 FROM transactions WHERE user_id = $1)
                   OR EXISTS (SELECT 1 FROM topup_requests WHERE user_id = $1) AS found"#,
        )
        .bind(user_id)
        .fetch_one(self.conn()?)
        .await?;
        row.col("found")
    }

    async fn delete_user(&mut self, user_id: UserId) -> Result<(), LedgerError> {
        // wallets cascade, referred users are set null by the FK
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(self.conn()?)
            .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::UserNotFound(user_id));
        }
        Ok(())
    }

    async fn mark_referral_bonus_paid_if_unpaid(
        &mut self,
        user_id: UserId,
    ) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            r#"UPDATE users SET referral_bonus_paid = TRUE
               WHERE id = $1 AND referral_bonus_paid = FALSE"#,
        )
        .bind(user_id)
        .execute(self.conn()?)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn count_qualified_referrals(
        &mut self,
        referrer_id: UserId,
        currency: Currency,
        min_amount: Decimal,
    ) -> Result<u64, LedgerError> {
        let row = sqlx::query(
            r#"SELECT COUNT(DISTINCT t.user_id) AS qualified
               FROM topup_requests t
               JOIN users u ON u.id = t.user_id
               WHERE u.referred_by_user_id = $1
                 AND t.status = 'APPROVED'
                 AND t.currency = $2
                 AND t.amount >= $3"#,
        )
        .bind(referrer_id)
        .bind(currency.as_str())
        .bind(min_amount)
        .fetch_one(self.conn()?)
        .await?;
        let qualified: i64 = row.col("qualified")?;
        Ok(qualified.max(0) as u64)
    }

    async fn lock_wallet(&mut self, user_id: UserId) -> Result<Wallet, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM wallets WHERE user_id = $1 FOR UPDATE",
            WALLET_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(self.conn()?)
        .await?;
        match row {
            Some(row) => wallet_from_row(&row),
            None => Err(LedgerError::WalletNotFound(user_id)),
        }
    }

    async fn post(&mut self, posting: Posting) -> Result<LedgerEntry, LedgerError> {
        let d_htg = posting.delta_for(Currency::Htg);
        let d_usd = posting.delta_for(Currency::Usd);

        let updated = sqlx::query(
            r#"UPDATE wallets
               SET htg = htg + $1, usd = usd + $2, updated_at = NOW()
               WHERE user_id = $3 AND htg + $1 >= 0 AND usd + $2 >= 0"#,
        )
        .bind(d_htg)
        .bind(d_usd)
        .bind(posting.user_id)
        .execute(self.conn()?)
        .await?;

        if updated.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM wallets WHERE user_id = $1")
                .bind(posting.user_id)
                .fetch_optional(self.conn()?)
                .await?;
            if exists.is_none() {
                return Err(LedgerError::WalletNotFound(posting.user_id));
            }
            let short = if d_htg < Decimal::ZERO {
                Currency::Htg
            } else {
                Currency::Usd
            };
            return Err(LedgerError::InsufficientBalance(short));
        }

        let row = sqlx::query(
            r#"INSERT INTO transactions
                   (user_id, type, currency, amount, direction, counter_amount, rate_used, note)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING id, created_at"#,
        )
        .bind(posting.user_id)
        .bind(posting.entry_type.as_str())
        .bind(posting.currency.as_str())
        .bind(posting.amount)
        .bind(posting.direction.as_str())
        .bind(posting.counter_amount)
        .bind(posting.rate_used)
        .bind(&posting.note)
        .fetch_one(self.conn()?)
        .await?;

        let id = row.col("id")?;
        let created_at = row.col("created_at")?;
        Ok(posting.into_entry(id, created_at))
    }

    async fn insert_topup(&mut self, new: NewTopupRequest) -> Result<TopupRequest, LedgerError> {
        let row = sqlx::query(&format!(
            r#"INSERT INTO topup_requests
                   (user_id, amount, fee_amount, net_amount, currency,
                    method, reference, proof_url, note)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
               RETURNING {}"#,
            TOPUP_COLUMNS
        ))
        .bind(new.user_id)
        .bind(new.amount)
        .bind(new.fee_amount)
        .bind(new.net_amount)
        .bind(new.currency.as_str())
        .bind(new.method.as_str())
        .bind(&new.reference)
        .bind(&new.proof_url)
        .bind(&new.note)
        .fetch_one(self.conn()?)
        .await?;
        topup_from_row(&row)
    }

    async fn get_topup(&mut self, id: TopupId) -> Result<Option<TopupRequest>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM topup_requests WHERE id = $1",
            TOPUP_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;
        row.as_ref().map(topup_from_row).transpose()
    }

    async fn decide_topup_if_pending(
        &mut self,
        id: TopupId,
        decision: &DecisionRecord,
    ) -> Result<Option<TopupRequest>, LedgerError> {
        let row = sqlx::query(&format!(
            r#"UPDATE topup_requests
               SET status = $2, admin_note = $3, decided_by = $4, decided_at = $5
               WHERE id = $1 AND status = 'PENDING'
               RETURNING {}"#,
            TOPUP_COLUMNS
        ))
        .bind(id)
        .bind(decision.decision.status().as_str())
        .bind(&decision.admin_note)
        .bind(decision.admin_id)
        .bind(decision.decided_at)
        .fetch_optional(self.conn()?)
        .await?;
        row.as_ref().map(topup_from_row).transpose()
    }

    async fn get_fx(&mut self) -> Result<FxSetting, LedgerError> {
        let defaults = FxSetting::default();
        sqlx::query(
            r#"INSERT INTO fx_settings (id, sell_usd, buy_usd) VALUES (1, $1, $2)
               ON CONFLICT (id) DO NOTHING"#,
        )
        .bind(defaults.sell_usd)
        .bind(defaults.buy_usd)
        .execute(self.conn()?)
        .await?;

        let row = sqlx::query("SELECT sell_usd, buy_usd, updated_at FROM fx_settings WHERE id = 1")
            .fetch_one(self.conn()?)
            .await?;
        fx_from_row(&row)
    }

    async fn set_fx(&mut self, fx: &FxSetting) -> Result<(), LedgerError> {
        sqlx::query(
            r#"INSERT INTO fx_settings (id, sell_usd, buy_usd, updated_at)
               VALUES (1, $1, $2, $3)
               ON CONFLICT (id) DO UPDATE
               SET sell_usd = EXCLUDED.sell_usd,
                   buy_usd = EXCLUDED.buy_usd,
                   updated_at = EXCLUDED.updated_at"#,
        )
        .bind(fx.sell_usd)
        .bind(fx.buy_usd)
        .bind(fx.updated_at)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn insert_partner(&mut self, new: &NewPartner) -> Result<Partner, LedgerError> {
        let row = sqlx::query(&format!(
            r#"INSERT INTO partners (name, category, url, description, logo_url, active)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING {}"#,
            PARTNER_COLUMNS
        ))
        .bind(new.name.trim())
        .bind(new.category.trim())
        .bind(new.url.trim())
        .bind(&new.description)
        .bind(&new.logo_url)
        .bind(new.active)
        .fetch_one(self.conn()?)
        .await?;
        partner_from_row(&row)
    }

    async fn get_partner(&mut self, id: PartnerId) -> Result<Option<Partner>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM partners WHERE id = $1",
            PARTNER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;
        row.as_ref().map(partner_from_row).transpose()
    }

    async fn set_partner_active(
        &mut self,
        id: PartnerId,
        active: bool,
    ) -> Result<Option<Partner>, LedgerError> {
        let row = sqlx::query(&format!(
            "UPDATE partners SET active = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            PARTNER_COLUMNS
        ))
        .bind(id)
        .bind(active)
        .fetch_optional(self.conn()?)
        .await?;
        row.as_ref().map(partner_from_row).transpose()
    }

    async fn commit(&mut self) -> Result<(), LedgerError> {
        let tx = self.tx.take().ok_or_else(finished_unit)?;
        tx.commit().await?;
        Ok(())
    }
}
