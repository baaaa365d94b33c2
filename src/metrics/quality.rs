//! Data-quality confidence scoring.
//!
//! Downstream ranking disqualifies wallets below a confidence threshold,
//! so the score must be a pure function of observable run statistics with
//! every weight and cutoff coming from configuration.

use crate::config::QualityConfig;
use crate::models::QualityTier;

/// Observable statistics the score is derived from.
#[derive(Debug, Clone, Copy)]
pub struct QualityInputs {
    /// Swaps the parser accepted
    pub parsed_swap_count: u32,

    /// Swaps priced on both legs
    pub priced_swap_count: u32,

    /// Completed trades emitted by the ledger
    pub trade_count: u32,

    /// Days between first and last observed activity
    pub span_days: f64,

    /// Whether every internal reconciliation check passed
    pub consistent: bool,
}

/// Weighted 0-100 confidence score plus its tier.
pub fn score(inputs: &QualityInputs, config: &QualityConfig) -> (f64, QualityTier) {
    let volume_component = ratio(inputs.parsed_swap_count as f64, config.swap_count_target as f64);

    let coverage_component = if inputs.parsed_swap_count == 0 {
        0.0
    } else {
        ratio(
            inputs.priced_swap_count as f64,
            inputs.parsed_swap_count as f64,
        )
    };

    let trade_component = ratio(inputs.trade_count as f64, config.trade_count_target as f64);
    let span_component = ratio(inputs.span_days, config.span_target_days);
    let consistency_component = if inputs.consistent { 1.0 } else { 0.0 };

    let confidence = volume_component * config.weight_swap_volume
        + coverage_component * config.weight_price_coverage
        + trade_component * config.weight_trade_count
        + span_component * config.weight_time_span
        + consistency_component * config.weight_consistency;

    (confidence, tier_for(confidence, config))
}

fn tier_for(confidence: f64, config: &QualityConfig) -> QualityTier {
    if confidence >= config.excellent_min {
        QualityTier::Excellent
    } else if confidence >= config.good_min {
        QualityTier::Good
    } else if confidence >= config.fair_min {
        QualityTier::Fair
    } else {
        QualityTier::Poor
    }
}

fn ratio(value: f64, target: f64) -> f64 {
    if target <= 0.0 {
        return 0.0;
    }
    (value / target).clamp(0.0, 1.0)
}
