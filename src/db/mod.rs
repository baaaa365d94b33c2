//! Result persistence: analysis runs and latest per-wallet metrics.
//!
//! The engine itself is stateless; the CLI stores each run's outcome here
//! so `stats` can answer without re-fetching chain history.

use anyhow::{Context, Result};
use rust_decimal::prelude::ToPrimitive;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::models::{WalletAnalysisResult, WalletPerformanceMetrics};

/// Database connection pool for analysis results.
pub struct Database {
    pool: SqlitePool,
}

/// Stored run summary row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredRun {
    pub id: i64,
    pub batch_id: Option<String>,
    pub wallet: String,
    pub status: String,
    pub swap_count: i64,
    pub trade_count: i64,
    pub confidence_score: f64,
    pub error_summary: String,
    pub warning_count: i64,
    pub processing_ms: i64,
    pub analyzed_at: String,
}

/// Latest stored metrics row for one wallet.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredWalletMetrics {
    pub wallet: String,
    pub calculated_at: String,
    pub window_start: String,
    pub window_end: String,
    pub net_roi_percent: f64,
    pub max_drawdown_percent: f64,
    pub sharpe_ratio: f64,
    pub win_loss_ratio: f64,
    pub total_trades: i64,
    pub winning_trades: i64,
    pub losing_trades: i64,
    pub win_rate: f64,
    pub realized_pnl_usd: f64,
    pub unrealized_pnl_usd: f64,
    pub total_volume_usd: f64,
    pub total_fees_usd: f64,
    pub profit_factor: f64,
    pub calmar_ratio: f64,
    pub volatility: f64,
    pub value_at_risk_5pct: f64,
    pub confidence_score: f64,
    pub data_quality: String,
}

impl Database {
    /// Create a new database connection and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS analysis_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                batch_id TEXT,
                wallet TEXT NOT NULL,
                status TEXT NOT NULL,
                swap_count INTEGER NOT NULL DEFAULT 0,
                trade_count INTEGER NOT NULL DEFAULT 0,
                confidence_score REAL NOT NULL DEFAULT 0,
                error_summary TEXT NOT NULL DEFAULT '',
                warning_count INTEGER NOT NULL DEFAULT 0,
                processing_ms INTEGER NOT NULL DEFAULT 0,
                analyzed_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wallet_metrics (
                wallet TEXT PRIMARY KEY,
                calculated_at TEXT NOT NULL,
                window_start TEXT NOT NULL,
                window_end TEXT NOT NULL,
                net_roi_percent REAL NOT NULL DEFAULT 0,
                max_drawdown_percent REAL NOT NULL DEFAULT 0,
                sharpe_ratio REAL NOT NULL DEFAULT 0,
                win_loss_ratio REAL NOT NULL DEFAULT 0,
                total_trades INTEGER NOT NULL DEFAULT 0,
                winning_trades INTEGER NOT NULL DEFAULT 0,
                losing_trades INTEGER NOT NULL DEFAULT 0,
                win_rate REAL NOT NULL DEFAULT 0,
                realized_pnl_usd REAL NOT NULL DEFAULT 0,
                unrealized_pnl_usd REAL NOT NULL DEFAULT 0,
                total_volume_usd REAL NOT NULL DEFAULT 0,
                total_fees_usd REAL NOT NULL DEFAULT 0,
                profit_factor REAL NOT NULL DEFAULT 0,
                calmar_ratio REAL NOT NULL DEFAULT 0,
                volatility REAL NOT NULL DEFAULT 0,
                value_at_risk_5pct REAL NOT NULL DEFAULT 0,
                confidence_score REAL NOT NULL DEFAULT 0,
                data_quality TEXT NOT NULL DEFAULT 'poor'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_runs_wallet ON analysis_runs(wallet, analyzed_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record one wallet's run outcome.
    pub async fn record_run(
        &self,
        batch_id: Option<&str>,
        result: &WalletAnalysisResult,
    ) -> Result<()> {
        let error_summary = result
            .errors
            .iter()
            .map(|e| e.kind())
            .collect::<Vec<_>>()
            .join(",");

        let confidence = result
            .metrics
            .as_ref()
            .map(|m| m.confidence_score)
            .unwrap_or(0.0);

        sqlx::query(
            r#"
            INSERT INTO analysis_runs
                (batch_id, wallet, status, swap_count, trade_count, confidence_score,
                 error_summary, warning_count, processing_ms, analyzed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(batch_id)
        .bind(&result.wallet)
        .bind(result.status.as_str())
        .bind(result.swap_count as i64)
        .bind(result.trade_count as i64)
        .bind(confidence)
        .bind(error_summary)
        .bind(result.warnings.len() as i64)
        .bind(result.processing_ms as i64)
        .bind(result.analyzed_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to record analysis run")?;

        Ok(())
    }

    /// Upsert the latest metrics for a wallet.
    pub async fn save_metrics(&self, metrics: &WalletPerformanceMetrics) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO wallet_metrics
                (wallet, calculated_at, window_start, window_end,
                 net_roi_percent, max_drawdown_percent, sharpe_ratio, win_loss_ratio,
                 total_trades, winning_trades, losing_trades, win_rate,
                 realized_pnl_usd, unrealized_pnl_usd, total_volume_usd, total_fees_usd,
                 profit_factor, calmar_ratio, volatility, value_at_risk_5pct,
                 confidence_score, data_quality)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&metrics.wallet)
        .bind(metrics.calculated_at.to_rfc3339())
        .bind(metrics.window_start.to_rfc3339())
        .bind(metrics.window_end.to_rfc3339())
        .bind(metrics.net_roi_percent)
        .bind(metrics.max_drawdown_percent)
        .bind(metrics.sharpe_ratio)
        .bind(metrics.win_loss_ratio)
        .bind(metrics.total_trades as i64)
        .bind(metrics.winning_trades as i64)
        .bind(metrics.losing_trades as i64)
        .bind(metrics.win_rate)
        .bind(metrics.realized_pnl_usd.to_f64().unwrap_or(0.0))
        .bind(metrics.unrealized_pnl_usd.to_f64().unwrap_or(0.0))
        .bind(metrics.total_volume_usd.to_f64().unwrap_or(0.0))
        .bind(metrics.total_fees_usd.to_f64().unwrap_or(0.0))
        .bind(metrics.profit_factor)
        .bind(metrics.calmar_ratio)
        .bind(metrics.volatility)
        .bind(metrics.value_at_risk_5pct)
        .bind(metrics.confidence_score)
        .bind(metrics.data_quality.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to save wallet metrics")?;

        Ok(())
    }

    /// Latest stored metrics for a wallet, if any.
    pub async fn latest_metrics(&self, wallet: &str) -> Result<Option<StoredWalletMetrics>> {
        let row = sqlx::query_as::<_, StoredWalletMetrics>(
            "SELECT * FROM wallet_metrics WHERE wallet = ?",
        )
        .bind(wallet)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load wallet metrics")?;

        Ok(row)
    }

    /// Most recent runs for a wallet, newest first.
    pub async fn recent_runs(&self, wallet: &str, limit: u32) -> Result<Vec<StoredRun>> {
        let rows = sqlx::query_as::<_, StoredRun>(
            "SELECT * FROM analysis_runs WHERE wallet = ? ORDER BY analyzed_at DESC LIMIT ?",
        )
        .bind(wallet)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load analysis runs")?;

        Ok(rows)
    }
}
