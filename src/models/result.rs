//! Analysis result envelopes returned by the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AnalysisError;

use super::metrics::WalletPerformanceMetrics;
use super::position::TokenPosition;

/// Terminal status of one wallet's analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    /// Fully analyzed; trade count met the configured minimum
    Completed,

    /// Usable output, but below the confidence threshold
    Partial,

    /// No usable data (or an unexpected internal error)
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Partial => "partial",
            AnalysisStatus::Failed => "failed",
        }
    }
}

/// Scheduling priority recorded on a batch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchPriority {
    Low,
    #[default]
    Normal,
    High,
}

/// Everything produced by one wallet's pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct WalletAnalysisResult {
    pub wallet: String,
    pub status: AnalysisStatus,

    /// Present unless the run failed before the metrics stage
    pub metrics: Option<WalletPerformanceMetrics>,

    /// Open positions at the end of the window
    pub open_positions: Vec<TokenPosition>,

    /// Transactions fetched from the ledger source
    pub transaction_count: u32,

    /// Swaps the parser accepted
    pub swap_count: u32,

    /// Swaps that could be priced on both legs
    pub priced_swap_count: u32,

    /// Completed trades emitted by the position ledger
    pub trade_count: u32,

    /// Recoverable errors accumulated across all stages
    pub errors: Vec<AnalysisError>,

    /// Validation findings that did not block the result
    pub warnings: Vec<String>,

    pub processing_ms: u64,
    pub analyzed_at: DateTime<Utc>,
}

impl WalletAnalysisResult {
    /// A failed result carrying a single error.
    pub fn failed(wallet: String, error: AnalysisError, processing_ms: u64) -> Self {
        Self {
            wallet,
            status: AnalysisStatus::Failed,
            metrics: None,
            open_positions: Vec::new(),
            transaction_count: 0,
            swap_count: 0,
            priced_swap_count: 0,
            trade_count: 0,
            errors: vec![error],
            warnings: Vec::new(),
            processing_ms,
            analyzed_at: Utc::now(),
        }
    }
}

/// Request for analyzing many wallets in one pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub wallet_addresses: Vec<String>,
    pub config: crate::config::AnalysisConfig,
    #[serde(default)]
    pub priority: BatchPriority,
}

/// Aggregate outcome of a batch run: every wallet reaches a terminal
/// state and appears exactly once in `results`.
#[derive(Debug, Clone, Serialize)]
pub struct BatchAnalysisResult {
    pub batch_id: Uuid,
    pub priority: BatchPriority,
    pub results: Vec<WalletAnalysisResult>,
    pub completed_count: u32,
    pub partial_count: u32,
    pub failed_count: u32,
    pub total_processing_ms: u64,
    pub average_processing_ms: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchAnalysisResult {
    /// Assemble the aggregate from per-wallet results.
    pub fn from_results(
        batch_id: Uuid,
        priority: BatchPriority,
        results: Vec<WalletAnalysisResult>,
        started_at: DateTime<Utc>,
        total_processing_ms: u64,
    ) -> Self {
        let completed_count = results
            .iter()
            .filter(|r| r.status == AnalysisStatus::Completed)
            .count() as u32;
        let partial_count = results
            .iter()
            .filter(|r| r.status == AnalysisStatus::Partial)
            .count() as u32;
        let failed_count = results
            .iter()
            .filter(|r| r.status == AnalysisStatus::Failed)
            .count() as u32;

        let average_processing_ms = if results.is_empty() {
            0
        } else {
            results.iter().map(|r| r.processing_ms).sum::<u64>() / results.len() as u64
        };

        Self {
            batch_id,
            priority,
            results,
            completed_count,
            partial_count,
            failed_count,
            total_processing_ms,
            average_processing_ms,
            started_at,
            finished_at: Utc::now(),
        }
    }
}
