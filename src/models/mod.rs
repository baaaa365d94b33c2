//! Data models for swaps, positions, completed trades, metrics, and results.

mod metrics;
mod position;
mod result;
mod swap;
mod trade;

pub use metrics::{QualityTier, WalletPerformanceMetrics, RATIO_SENTINEL};
pub use position::{is_dust, ConsumedLot, PurchaseLot, TokenPosition, EPSILON};
pub use result::{
    AnalysisStatus, BatchAnalysisResult, BatchPriority, BatchRequest, WalletAnalysisResult,
};
pub use swap::{EnhancedSwap, Swap, SwapKind, TokenLeg};
pub use trade::CompletedTrade;
