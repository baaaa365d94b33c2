//! Tagged error kinds for the analytics pipeline.
//!
//! Every recoverable failure is recorded on the wallet's result rather than
//! propagated; callers branch on the variant, not on message strings.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Closed set of failure kinds produced while analyzing a wallet.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisError {
    /// One transaction could not be interpreted as a swap.
    #[error("failed to parse transaction {signature}: {reason}")]
    Parsing { signature: String, reason: String },

    /// No USD price at or near the required timestamp.
    #[error("no USD price for {mint} at {timestamp}")]
    PriceUnavailable {
        mint: String,
        timestamp: DateTime<Utc>,
    },

    /// An internal invariant (e.g. lot-total reconciliation) failed.
    #[error("calculation error for {wallet}: {detail}")]
    Calculation { wallet: String, detail: String },

    /// A single wallet's pipeline exceeded its time budget.
    #[error("analysis of {wallet} timed out after {budget_secs}s")]
    Timeout { wallet: String, budget_secs: u64 },

    /// Upstream transaction/price source failed.
    #[error("{source_name} fetch failed: {detail}")]
    Fetch { source_name: String, detail: String },
}

impl AnalysisError {
    /// Short machine-readable tag for persistence and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::Parsing { .. } => "parsing",
            AnalysisError::PriceUnavailable { .. } => "price_unavailable",
            AnalysisError::Calculation { .. } => "calculation",
            AnalysisError::Timeout { .. } => "timeout",
            AnalysisError::Fetch { .. } => "fetch",
        }
    }

    pub fn fetch(source_name: impl Into<String>, detail: impl ToString) -> Self {
        AnalysisError::Fetch {
            source_name: source_name.into(),
            detail: detail.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_stable() {
        let err = AnalysisError::Parsing {
            signature: "sig".to_string(),
            reason: "bad data".to_string(),
        };
        assert_eq!(err.kind(), "parsing");

        let err = AnalysisError::Timeout {
            wallet: "w".to_string(),
            budget_secs: 120,
        };
        assert_eq!(err.kind(), "timeout");
        assert!(err.to_string().contains("120"));
    }
}
