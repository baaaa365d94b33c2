//! Completed-trade records produced when a disposal consumes a purchase lot.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::position::is_dust;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// The record of closing part of a position against one specific lot.
///
/// One sale swap may produce several of these, one per lot it consumes,
/// oldest lot first. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedTrade {
    pub mint: String,
    pub symbol: String,

    /// When the consumed lot was acquired
    pub entry_time: DateTime<Utc>,

    /// When the disposal swap executed
    pub exit_time: DateTime<Utc>,

    /// USD price per token at acquisition
    pub entry_price_usd: Decimal,

    /// USD price per token at disposal
    pub exit_price_usd: Decimal,

    /// Token quantity closed against this lot
    pub quantity: Decimal,

    /// USD cost basis of the closed quantity
    pub entry_value_usd: Decimal,

    /// USD proceeds of the closed quantity
    pub exit_value_usd: Decimal,

    /// Proceeds minus cost basis
    pub realized_pnl_usd: Decimal,

    /// Days between entry and exit
    pub holding_period_days: f64,

    /// Realized P&L as a percentage of the entry value; 0 when the
    /// entry value is zero (untracked inflow fallback)
    pub roi_percent: f64,

    /// Swap that created the consumed lot
    pub entry_signature: String,

    /// Swap that closed it
    pub exit_signature: String,
}

impl CompletedTrade {
    /// Build a trade record, deriving holding period and ROI.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mint: String,
        symbol: String,
        entry_time: DateTime<Utc>,
        exit_time: DateTime<Utc>,
        entry_price_usd: Decimal,
        exit_price_usd: Decimal,
        quantity: Decimal,
        entry_value_usd: Decimal,
        exit_value_usd: Decimal,
        entry_signature: String,
        exit_signature: String,
    ) -> Self {
        let realized_pnl_usd = exit_value_usd - entry_value_usd;

        let held_secs = (exit_time - entry_time).num_seconds().max(0) as f64;
        let holding_period_days = held_secs / SECONDS_PER_DAY;

        let roi_percent = if is_dust(entry_value_usd) {
            0.0
        } else {
            (realized_pnl_usd / entry_value_usd)
                .to_f64()
                .unwrap_or(0.0)
                * 100.0
        };

        Self {
            mint,
            symbol,
            entry_time,
            exit_time,
            entry_price_usd,
            exit_price_usd,
            quantity,
            entry_value_usd,
            exit_value_usd,
            realized_pnl_usd,
            holding_period_days,
            roi_percent,
            entry_signature,
            exit_signature,
        }
    }

    pub fn is_win(&self) -> bool {
        self.realized_pnl_usd > Decimal::ZERO
    }

    pub fn is_loss(&self) -> bool {
        self.realized_pnl_usd < Decimal::ZERO
    }
}
