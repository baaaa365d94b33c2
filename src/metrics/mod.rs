//! Performance metrics computation and data-quality scoring.

mod calculator;
mod quality;

pub use calculator::{MetricsCalculator, MetricsInput};
pub use quality::{score as quality_score, QualityInputs};
