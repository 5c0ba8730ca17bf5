//! Database persistence for the dedup record and the copy-trade outcome log.
//!
//! Stores what is needed to stay correct across restarts:
//! - Seen trades per trader (never mirror the same trade twice)
//! - Every filtered, executed and failed copy attempt

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::{info, warn};

use crate::outcome::{Outcome, OutcomeSink};
use crate::shutdown::Releasable;

/// How a seen trade was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeenStatus {
    /// Order was filled
    Executed,
    /// Deliberately not copied (sizing filters)
    Skipped,
}

impl SeenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeenStatus::Executed => "executed",
            SeenStatus::Skipped => "skipped",
        }
    }
}

/// Records which trades have already been mirrored, per trader.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn has_seen(&self, trader: &str, trade_id: &str) -> Result<bool>;
    async fn record_trade(&self, trader: &str, trade_id: &str, status: SeenStatus) -> Result<()>;
    async fn close(&self);
}

/// Stored copy trade record.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredCopyTrade {
    pub trader_address: String,
    pub source_trade_id: String,
    pub side: String,
    pub source_amount: f64,
    pub copy_ratio: Option<f64>,
    pub amount: Option<f64>,
    pub status: String,
    pub tokens_filled: Option<f64>,
    pub total_cost: Option<f64>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub attempts: i64,
    pub created_at: String,
}

impl StoredCopyTrade {
    /// One-line summary: the fill, the failure, or the skip reason.
    pub fn detail(&self) -> String {
        match (self.tokens_filled, self.total_cost, &self.error_kind, &self.error_message) {
            (Some(tokens), Some(cost), _, _) => format!("{tokens:.2} tokens for ${cost:.2} ({} attempt(s))", self.attempts),
            (_, _, Some(kind), Some(msg)) => format!("{kind}: {msg} ({} attempt(s))", self.attempts),
            (_, _, Some(kind), None) => kind.clone(),
            (_, _, None, Some(msg)) => msg.clone(),
            _ => String::new(),
        }
    }
}

/// Aggregate counts for the `status` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyTradeStats {
    pub seen: i64,
    pub total: i64,
    pub executed: i64,
    pub failed: i64,
    pub filtered: i64,
}

/// Database connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .with_context(|| format!("Failed to connect to database {database_url}"))?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Private in-memory database. A single connection keeps every query on the same store.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run all database migrations.
    async fn run_migrations(&self) -> Result<()> {
        // Seen trades (dedup record)
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS seen_trades (
                trader_address TEXT NOT NULL,
                trade_id TEXT NOT NULL,
                status TEXT NOT NULL,
                seen_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (trader_address, trade_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Copy trade outcome log
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS copy_trades (
                id TEXT PRIMARY KEY,
                trader_address TEXT NOT NULL,
                source_trade_id TEXT NOT NULL,
                market_id TEXT NOT NULL,
                side TEXT NOT NULL,
                source_amount REAL NOT NULL,
                source_price REAL NOT NULL,
                copy_ratio REAL,
                amount REAL,
                status TEXT NOT NULL,
                tokens_filled REAL,
                total_cost REAL,
                error_kind TEXT,
                error_message TEXT,
                attempts INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_copy_trades_status ON copy_trades(status)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ==================== Seen Trades ====================

    /// Check if we've already seen a trade.
    pub async fn has_seen_trade(&self, trader_address: &str, trade_id: &str) -> Result<bool> {
        let result: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM seen_trades WHERE trader_address = ? AND trade_id = ?")
                .bind(trader_address.to_lowercase())
                .bind(trade_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(result.is_some())
    }

    /// Mark a trade as seen. The first status recorded wins.
    pub async fn mark_trade_seen(&self, trader_address: &str, trade_id: &str, status: SeenStatus) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO seen_trades (trader_address, trade_id, status) VALUES (?, ?, ?)")
            .bind(trader_address.to_lowercase())
            .bind(trade_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ==================== Copy Trades ====================

    /// Append an outcome to the copy trade log. Detections are not logged.
    pub async fn save_outcome(&self, outcome: &Outcome) -> Result<()> {
        let id = uuid::Uuid::new_v4().to_string();

        let query = sqlx::query(
            r#"
            INSERT INTO copy_trades (
                id, trader_address, source_trade_id, market_id, side,
                source_amount, source_price, copy_ratio, amount, status,
                tokens_filled, total_cost, error_kind, error_message, attempts
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id);

        let query = match outcome {
            Outcome::Detected(_) => return Ok(()),
            Outcome::Filtered { trade, reason } => query
                .bind(&trade.trader_address)
                .bind(&trade.trade_id)
                .bind(&trade.market_id)
                .bind(trade.side.as_str())
                .bind(trade.amount.to_f64().unwrap_or(0.0))
                .bind(trade.price.to_f64().unwrap_or(0.0))
                .bind(None::<f64>)
                .bind(None::<f64>)
                .bind(outcome.status())
                .bind(None::<f64>)
                .bind(None::<f64>)
                .bind(None::<String>)
                .bind(reason.to_string())
                .bind(0i64),
            Outcome::Executed { order, result } | Outcome::Failed { order, result } => query
                .bind(&order.trader_address)
                .bind(&order.source_trade_id)
                .bind(&order.market_id)
                .bind(order.side.as_str())
                .bind((order.amount / nonzero(order.copy_ratio)).to_f64().unwrap_or(0.0))
                .bind(order.price.to_f64().unwrap_or(0.0))
                .bind(order.copy_ratio.to_f64())
                .bind(order.amount.to_f64())
                .bind(outcome.status())
                .bind(result.tokens_filled.and_then(|t| t.to_f64()))
                .bind(result.total_cost.and_then(|c| c.to_f64()))
                .bind(result.error_kind.map(|k| k.as_str().to_string()))
                .bind(result.error_message.clone())
                .bind(result.attempts as i64),
        };

        query.execute(&self.pool).await?;
        Ok(())
    }

    /// Most recent copy trades, newest first.
    pub async fn get_recent_copy_trades(&self, limit: i64) -> Result<Vec<StoredCopyTrade>> {
        sqlx::query_as::<_, StoredCopyTrade>(
            r#"
            SELECT trader_address, source_trade_id, side, source_amount, copy_ratio, amount, status,
                   tokens_filled, total_cost, error_kind, error_message, attempts, created_at
            FROM copy_trades
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch copy trades")
    }

    /// Get copy trade statistics.
    pub async fn get_copy_trade_stats(&self) -> Result<CopyTradeStats> {
        let (seen,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM seen_trades")
            .fetch_one(&self.pool)
            .await?;

        let (total, executed, failed, filtered): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN status = 'executed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'filtered' THEN 1 ELSE 0 END), 0)
            FROM copy_trades
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(CopyTradeStats {
            seen,
            total,
            executed,
            failed,
            filtered,
        })
    }
}

/// Source notional is amount / ratio; a zero ratio never reaches the log.
fn nonzero(ratio: rust_decimal::Decimal) -> rust_decimal::Decimal {
    if ratio.is_zero() {
        rust_decimal::Decimal::ONE
    } else {
        ratio
    }
}

#[async_trait]
impl PersistenceStore for Database {
    async fn has_seen(&self, trader: &str, trade_id: &str) -> Result<bool> {
        self.has_seen_trade(trader, trade_id).await
    }

    async fn record_trade(&self, trader: &str, trade_id: &str, status: SeenStatus) -> Result<()> {
        self.mark_trade_seen(trader, trade_id, status).await
    }

    async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
            info!("Database connection closed");
        }
    }
}

#[async_trait]
impl OutcomeSink for Database {
    async fn record(&self, outcome: &Outcome) {
        if let Err(e) = self.save_outcome(outcome).await {
            warn!(trade_id = %outcome.trade_id(), status = outcome.status(), error = %e, "Failed to log outcome");
        }
    }
}

#[async_trait]
impl Releasable for Database {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn release(&self) -> Result<()> {
        PersistenceStore::close(self).await;
        Ok(())
    }
}
