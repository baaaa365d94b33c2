//! Per-wallet performance metrics: ROI, MDD, Sharpe, win/loss, and
//! supporting statistics used to rank traders.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Sentinel for ratios whose denominator is zero while the numerator is
/// positive ("all wins, no losses"). Treated downstream as an undefined
/// upper bound, never as a real measurement.
pub const RATIO_SENTINEL: f64 = 99_999.0;

/// Four-level data-quality tier derived from the confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Excellent => "excellent",
            QualityTier::Good => "good",
            QualityTier::Fair => "fair",
            QualityTier::Poor => "poor",
        }
    }
}

/// Comprehensive performance metrics for one wallet over one window.
///
/// Recomputed from scratch on every analysis run, never updated
/// incrementally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletPerformanceMetrics {
    /// Wallet address
    pub wallet: String,

    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub calculated_at: DateTime<Utc>,

    // === Core ranking metrics ===
    /// Net ROI % over realized + unrealized P&L
    pub net_roi_percent: f64,

    /// Maximum drawdown as a percentage of the cumulative P&L peak
    pub max_drawdown_percent: f64,

    /// Annualized Sharpe ratio over daily returns
    pub sharpe_ratio: f64,

    /// Winning trades / losing trades; RATIO_SENTINEL when undefined
    pub win_loss_ratio: f64,

    /// Completed trades in the window
    pub total_trades: u32,

    // === P&L breakdown ===
    pub realized_pnl_usd: Decimal,
    pub unrealized_pnl_usd: Decimal,
    pub total_cost_basis_usd: Decimal,

    // === Supporting statistics ===
    pub total_volume_usd: Decimal,
    pub total_fees_usd: Decimal,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub win_rate: f64,
    pub average_trade_size_usd: Decimal,
    pub average_holding_period_days: f64,
    pub largest_win_usd: Decimal,
    pub largest_loss_usd: Decimal,

    /// Gross wins / gross losses; RATIO_SENTINEL when undefined
    pub profit_factor: f64,

    /// Annualized return / max drawdown
    pub calmar_ratio: f64,

    /// Standard deviation of per-trade ROI %
    pub volatility: f64,

    /// 5th-percentile per-trade ROI %
    pub value_at_risk_5pct: f64,

    pub best_month_pnl_usd: Decimal,
    pub worst_month_pnl_usd: Decimal,
    pub max_win_streak: u32,
    pub max_loss_streak: u32,

    // === Data quality ===
    /// Priced swaps / parsed swaps
    pub price_coverage: f64,

    pub open_position_count: u32,
    pub data_quality: QualityTier,

    /// 0-100 weighted confidence score
    pub confidence_score: f64,
}

impl WalletPerformanceMetrics {
    /// Empty metrics for a wallet with no analyzable activity.
    pub fn empty(wallet: String, window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Self {
        Self {
            wallet,
            window_start,
            window_end,
            calculated_at: Utc::now(),
            net_roi_percent: 0.0,
            max_drawdown_percent: 0.0,
            sharpe_ratio: 0.0,
            win_loss_ratio: 0.0,
            total_trades: 0,
            realized_pnl_usd: Decimal::ZERO,
            unrealized_pnl_usd: Decimal::ZERO,
            total_cost_basis_usd: Decimal::ZERO,
            total_volume_usd: Decimal::ZERO,
            total_fees_usd: Decimal::ZERO,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            average_trade_size_usd: Decimal::ZERO,
            average_holding_period_days: 0.0,
            largest_win_usd: Decimal::ZERO,
            largest_loss_usd: Decimal::ZERO,
            profit_factor: 0.0,
            calmar_ratio: 0.0,
            volatility: 0.0,
            value_at_risk_5pct: 0.0,
            best_month_pnl_usd: Decimal::ZERO,
            worst_month_pnl_usd: Decimal::ZERO,
            max_win_streak: 0,
            max_loss_streak: 0,
            price_coverage: 0.0,
            open_position_count: 0,
            data_quality: QualityTier::Poor,
            confidence_score: 0.0,
        }
    }

    /// Total P&L across realized and unrealized components.
    pub fn total_pnl_usd(&self) -> Decimal {
        self.realized_pnl_usd + self.unrealized_pnl_usd
    }
}
