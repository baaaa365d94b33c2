//! Configuration for analysis runs, batch scheduling, and scoring thresholds.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-request analysis options. Absent values mean "no filter".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Only analyze swaps at or after this time
    pub start_date: Option<DateTime<Utc>>,

    /// Only analyze swaps at or before this time
    pub end_date: Option<DateTime<Utc>>,

    /// Cap on how many signatures are fetched per wallet
    pub max_transactions: Option<usize>,

    /// Drop swaps whose disposal leg is worth less than this in USD
    pub min_trade_value_usd: Option<Decimal>,

    /// Restrict analysis to these token mints
    pub include_tokens: Option<Vec<String>>,

    /// Exclude these token mints from analysis
    pub exclude_tokens: Option<Vec<String>>,
}

impl AnalysisConfig {
    /// Whether a mint passes the include/exclude filters.
    pub fn mint_allowed(&self, mint: &str) -> bool {
        if let Some(include) = &self.include_tokens {
            if !include.iter().any(|m| m == mint) {
                return false;
            }
        }
        if let Some(exclude) = &self.exclude_tokens {
            if exclude.iter().any(|m| m == mint) {
                return false;
            }
        }
        true
    }
}

/// Engine-level settings shared by every wallet analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Maximum wallets analyzed concurrently in a batch
    pub max_concurrent: usize,

    /// Token-bucket refill rate gating how fast wallet pipelines start
    pub requests_per_second: f64,

    /// Time budget for a single wallet's pipeline
    pub wallet_timeout_secs: u64,

    /// Signatures fetched per wallet when the request sets no cap
    pub default_max_transactions: usize,

    /// Minimum completed trades for a `completed` (vs `partial`) status
    pub min_completed_trades: u32,

    /// Validation bound on |Net ROI %|; beyond it a warning is attached
    pub roi_sanity_limit: f64,

    pub metrics: MetricsConfig,
    pub quality: QualityConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            requests_per_second: 5.0,
            wallet_timeout_secs: 120,
            default_max_transactions: 500,
            min_completed_trades: 5,
            roi_sanity_limit: 10_000.0,
            metrics: MetricsConfig::default(),
            quality: QualityConfig::default(),
        }
    }
}

impl AnalyzerConfig {
    pub fn wallet_timeout(&self) -> Duration {
        Duration::from_secs(self.wallet_timeout_secs)
    }
}

/// Inputs to the statistical metrics that are policy, not math.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Annual risk-free rate used in the Sharpe ratio (e.g. 0.02 = 2%)
    pub risk_free_rate_annual: f64,

    /// Annualization factor for daily Sharpe (trading days per year)
    pub trading_days_per_year: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            risk_free_rate_annual: 0.02,
            trading_days_per_year: 252.0,
        }
    }
}

/// Weights and thresholds for the data-quality confidence score.
///
/// Each component is normalized to [0, 1] against its target and multiplied
/// by its weight; the weights sum to 100 so the score lands on a 0-100 scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Parsed swap count at which the volume component maxes out
    pub swap_count_target: u32,

    /// Completed trade count at which the trade component maxes out
    pub trade_count_target: u32,

    /// Days of trading history at which the span component maxes out
    pub span_target_days: f64,

    pub weight_swap_volume: f64,
    pub weight_price_coverage: f64,
    pub weight_trade_count: f64,
    pub weight_time_span: f64,
    pub weight_consistency: f64,

    /// Tier cutoffs on the 0-100 confidence score
    pub excellent_min: f64,
    pub good_min: f64,
    pub fair_min: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            swap_count_target: 50,
            trade_count_target: 20,
            span_target_days: 30.0,
            weight_swap_volume: 20.0,
            weight_price_coverage: 30.0,
            weight_trade_count: 25.0,
            weight_time_span: 15.0,
            weight_consistency: 10.0,
            excellent_min: 85.0,
            good_min: 65.0,
            fair_min: 40.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_filters() {
        let config = AnalysisConfig {
            include_tokens: Some(vec!["A".to_string(), "B".to_string()]),
            exclude_tokens: Some(vec!["B".to_string()]),
            ..Default::default()
        };

        assert!(config.mint_allowed("A"));
        // Exclusion wins over inclusion
        assert!(!config.mint_allowed("B"));
        assert!(!config.mint_allowed("C"));

        let open = AnalysisConfig::default();
        assert!(open.mint_allowed("anything"));
    }

    #[test]
    fn test_quality_weights_sum_to_hundred() {
        let q = QualityConfig::default();
        let total = q.weight_swap_volume
            + q.weight_price_coverage
            + q.weight_trade_count
            + q.weight_time_span
            + q.weight_consistency;
        assert!((total - 100.0).abs() < f64::EPSILON);
    }
}
