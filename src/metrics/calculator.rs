//! Calculator for wallet performance metrics: ROI, MDD, Sharpe, win/loss
//! ratio, and the supporting statistics used to rank and disqualify wallets.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use statrs::statistics::Statistics;
use tracing::debug;

use crate::config::{MetricsConfig, QualityConfig};
use crate::models::{
    is_dust, CompletedTrade, EnhancedSwap, TokenPosition, WalletPerformanceMetrics, RATIO_SENTINEL,
};

use super::quality::{self, QualityInputs};

const DAYS_PER_YEAR: f64 = 365.0;

/// Everything one wallet's pipeline feeds into the metrics stage.
pub struct MetricsInput<'a> {
    pub wallet: &'a str,
    pub enhanced_swaps: &'a [EnhancedSwap],
    pub completed_trades: &'a [CompletedTrade],
    pub open_positions: &'a [TokenPosition],
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,

    /// Swaps the parser accepted (priced or not), for coverage scoring
    pub parsed_swap_count: u32,

    /// Whether every ledger reconciliation check passed
    pub consistent: bool,
}

/// Pure, deterministic metrics computation; no I/O.
pub struct MetricsCalculator;

impl MetricsCalculator {
    pub fn compute(
        input: &MetricsInput<'_>,
        config: &MetricsConfig,
        quality_config: &QualityConfig,
    ) -> WalletPerformanceMetrics {
        let mut metrics = WalletPerformanceMetrics::empty(
            input.wallet.to_string(),
            input.window_start,
            input.window_end,
        );

        // Exit-time order drives the drawdown walk and streaks
        let mut trades: Vec<&CompletedTrade> = input.completed_trades.iter().collect();
        trades.sort_by(|a, b| {
            a.exit_time
                .cmp(&b.exit_time)
                .then_with(|| a.exit_signature.cmp(&b.exit_signature))
        });

        metrics.total_trades = trades.len() as u32;
        metrics.open_position_count = input.open_positions.len() as u32;

        Self::accumulate_pnl(&mut metrics, &trades, input.open_positions);
        Self::accumulate_trade_stats(&mut metrics, &trades);
        metrics.max_drawdown_percent = Self::max_drawdown_percent(&trades);
        metrics.sharpe_ratio = Self::sharpe_ratio(&trades, config);
        Self::accumulate_calendar_stats(&mut metrics, &trades);
        metrics.calmar_ratio = Self::calmar_ratio(&metrics, input);

        metrics.total_volume_usd = input
            .enhanced_swaps
            .iter()
            .map(|s| s.token_in_value_usd)
            .sum();
        metrics.total_fees_usd = input.enhanced_swaps.iter().map(|s| s.fee_usd).sum();

        metrics.price_coverage = if input.parsed_swap_count == 0 {
            0.0
        } else {
            input.enhanced_swaps.len() as f64 / input.parsed_swap_count as f64
        };

        let quality_inputs = QualityInputs {
            parsed_swap_count: input.parsed_swap_count,
            priced_swap_count: input.enhanced_swaps.len() as u32,
            trade_count: metrics.total_trades,
            span_days: Self::activity_span_days(input),
            consistent: input.consistent,
        };
        let (confidence, tier) = quality::score(&quality_inputs, quality_config);
        metrics.confidence_score = confidence;
        metrics.data_quality = tier;

        debug!(
            wallet = %input.wallet,
            trades = metrics.total_trades,
            net_roi = metrics.net_roi_percent,
            sharpe = metrics.sharpe_ratio,
            max_drawdown = metrics.max_drawdown_percent,
            confidence = metrics.confidence_score,
            "Computed wallet performance metrics"
        );

        metrics
    }

    /// Net ROI over realized and unrealized P&L against total entry basis.
    fn accumulate_pnl(
        metrics: &mut WalletPerformanceMetrics,
        trades: &[&CompletedTrade],
        open_positions: &[TokenPosition],
    ) {
        metrics.realized_pnl_usd = trades.iter().map(|t| t.realized_pnl_usd).sum();
        metrics.unrealized_pnl_usd = open_positions.iter().map(|p| p.unrealized_pnl_usd).sum();

        let realized_basis: Decimal = trades.iter().map(|t| t.entry_value_usd).sum();
        let open_basis: Decimal = open_positions.iter().map(|p| p.total_cost_basis_usd).sum();
        metrics.total_cost_basis_usd = realized_basis + open_basis;

        metrics.net_roi_percent = if is_dust(metrics.total_cost_basis_usd) {
            0.0
        } else {
            ((metrics.realized_pnl_usd + metrics.unrealized_pnl_usd)
                / metrics.total_cost_basis_usd)
                .to_f64()
                .unwrap_or(0.0)
                * 100.0
        };
    }

    /// Win/loss counts, per-trade averages, profit factor, volatility, VaR.
    fn accumulate_trade_stats(metrics: &mut WalletPerformanceMetrics, trades: &[&CompletedTrade]) {
        if trades.is_empty() {
            return;
        }

        let wins: Vec<&&CompletedTrade> = trades.iter().filter(|t| t.is_win()).collect();
        let losses: Vec<&&CompletedTrade> = trades.iter().filter(|t| t.is_loss()).collect();

        metrics.winning_trades = wins.len() as u32;
        metrics.losing_trades = losses.len() as u32;
        metrics.win_rate = wins.len() as f64 / trades.len() as f64;

        metrics.win_loss_ratio = if !losses.is_empty() {
            wins.len() as f64 / losses.len() as f64
        } else if !wins.is_empty() {
            RATIO_SENTINEL
        } else {
            0.0
        };

        let gross_wins: Decimal = wins.iter().map(|t| t.realized_pnl_usd).sum();
        let gross_losses: Decimal = losses.iter().map(|t| t.realized_pnl_usd.abs()).sum();
        metrics.profit_factor = if gross_losses > Decimal::ZERO {
            (gross_wins / gross_losses).to_f64().unwrap_or(0.0)
        } else if gross_wins > Decimal::ZERO {
            RATIO_SENTINEL
        } else {
            0.0
        };

        metrics.largest_win_usd = trades
            .iter()
            .map(|t| t.realized_pnl_usd)
            .max()
            .unwrap_or(Decimal::ZERO)
            .max(Decimal::ZERO);
        metrics.largest_loss_usd = trades
            .iter()
            .map(|t| t.realized_pnl_usd)
            .min()
            .unwrap_or(Decimal::ZERO)
            .min(Decimal::ZERO);

        let total_entry: Decimal = trades.iter().map(|t| t.entry_value_usd).sum();
        metrics.average_trade_size_usd = total_entry / Decimal::from(trades.len() as u64);
        metrics.average_holding_period_days =
            trades.iter().map(|t| t.holding_period_days).sum::<f64>() / trades.len() as f64;

        // Per-trade ROI distribution: volatility and 5th-percentile VaR
        let mut rois: Vec<f64> = trades.iter().map(|t| t.roi_percent).collect();
        if rois.len() >= 2 {
            let volatility = rois.clone().std_dev();
            metrics.volatility = if volatility.is_finite() { volatility } else { 0.0 };
        }
        rois.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let index = ((rois.len() - 1) as f64 * 0.05).floor() as usize;
        metrics.value_at_risk_5pct = rois[index];
    }

    /// Peak-to-trough walk over the cumulative realized P&L curve.
    ///
    /// Percent of the largest observed peak; 0 when the peak never rises
    /// above zero.
    fn max_drawdown_percent(trades: &[&CompletedTrade]) -> f64 {
        let mut equity = Decimal::ZERO;
        let mut peak = Decimal::ZERO;
        let mut max_drawdown = Decimal::ZERO;

        for trade in trades {
            equity += trade.realized_pnl_usd;

            if equity > peak {
                peak = equity;
            }

            let drawdown = peak - equity;
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
            }
        }

        if peak > Decimal::ZERO {
            (max_drawdown / peak * Decimal::ONE_HUNDRED)
                .to_f64()
                .unwrap_or(0.0)
        } else {
            0.0
        }
    }

    /// Annualized Sharpe over calendar-day returns.
    ///
    /// A day's return is its realized P&L over its entry basis; days with
    /// no invested capital are excluded. Needs at least two qualifying
    /// days, otherwise 0 (never NaN).
    fn sharpe_ratio(trades: &[&CompletedTrade], config: &MetricsConfig) -> f64 {
        let mut days: BTreeMap<NaiveDate, (Decimal, Decimal)> = BTreeMap::new();
        for trade in trades {
            let entry = days
                .entry(trade.exit_time.date_naive())
                .or_insert((Decimal::ZERO, Decimal::ZERO));
            entry.0 += trade.realized_pnl_usd;
            entry.1 += trade.entry_value_usd;
        }

        let returns: Vec<f64> = days
            .values()
            .filter(|(_, basis)| *basis > Decimal::ZERO)
            .map(|(pnl, basis)| (pnl / basis).to_f64().unwrap_or(0.0))
            .collect();

        if returns.len() < 2 {
            return 0.0;
        }

        let mean = returns.clone().mean();
        let std_dev = returns.clone().std_dev();
        if !std_dev.is_finite() || std_dev <= 0.0 {
            return 0.0;
        }

        // De-annualize the risk-free rate via compound-interest inversion
        let daily_rf = (1.0 + config.risk_free_rate_annual).powf(1.0 / DAYS_PER_YEAR) - 1.0;

        let sharpe = (mean - daily_rf) / std_dev * config.trading_days_per_year.sqrt();
        if sharpe.is_finite() {
            sharpe
        } else {
            0.0
        }
    }

    /// Best/worst calendar-month P&L and longest win/loss streaks.
    fn accumulate_calendar_stats(
        metrics: &mut WalletPerformanceMetrics,
        trades: &[&CompletedTrade],
    ) {
        if trades.is_empty() {
            return;
        }

        let mut months: BTreeMap<String, Decimal> = BTreeMap::new();
        for trade in trades {
            *months
                .entry(trade.exit_time.format("%Y-%m").to_string())
                .or_insert(Decimal::ZERO) += trade.realized_pnl_usd;
        }
        metrics.best_month_pnl_usd = months.values().copied().max().unwrap_or(Decimal::ZERO);
        metrics.worst_month_pnl_usd = months.values().copied().min().unwrap_or(Decimal::ZERO);

        let mut win_streak = 0u32;
        let mut loss_streak = 0u32;
        for trade in trades {
            if trade.is_win() {
                win_streak += 1;
                loss_streak = 0;
            } else if trade.is_loss() {
                loss_streak += 1;
                win_streak = 0;
            } else {
                win_streak = 0;
                loss_streak = 0;
            }
            metrics.max_win_streak = metrics.max_win_streak.max(win_streak);
            metrics.max_loss_streak = metrics.max_loss_streak.max(loss_streak);
        }
    }

    /// Annualized return over maximum drawdown.
    fn calmar_ratio(metrics: &WalletPerformanceMetrics, input: &MetricsInput<'_>) -> f64 {
        if metrics.max_drawdown_percent <= 0.0 {
            return 0.0;
        }

        let window_days = ((input.window_end - input.window_start).num_seconds() as f64
            / 86_400.0)
            .max(1.0);
        let annualized_roi = metrics.net_roi_percent * DAYS_PER_YEAR / window_days;

        annualized_roi / metrics.max_drawdown_percent
    }

    /// Days between the first and last observed swap (falls back to
    /// completed trades when nothing was priced).
    fn activity_span_days(input: &MetricsInput<'_>) -> f64 {
        let span = if !input.enhanced_swaps.is_empty() {
            let first = input.enhanced_swaps.iter().map(|s| s.swap.block_time).min();
            let last = input.enhanced_swaps.iter().map(|s| s.swap.block_time).max();
            first.zip(last).map(|(f, l)| l - f)
        } else if !input.completed_trades.is_empty() {
            let first = input.completed_trades.iter().map(|t| t.entry_time).min();
            let last = input.completed_trades.iter().map(|t| t.exit_time).max();
            first.zip(last).map(|(f, l)| l - f)
        } else {
            None
        };

        span.map(|d| d.num_seconds() as f64 / 86_400.0)
            .unwrap_or(0.0)
            .max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    const DAY: i64 = 86_400;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn trade(entry_secs: i64, exit_secs: i64, entry_value: Decimal, pnl: Decimal) -> CompletedTrade {
        let exit_value = entry_value + pnl;
        let quantity = dec!(1);
        CompletedTrade::new(
            "mint".to_string(),
            "TOK".to_string(),
            ts(entry_secs),
            ts(exit_secs),
            entry_value,
            exit_value,
            quantity,
            entry_value,
            exit_value,
            format!("entry{}", entry_secs),
            format!("exit{}", exit_secs),
        )
    }

    fn compute(trades: &[CompletedTrade]) -> WalletPerformanceMetrics {
        let input = MetricsInput {
            wallet: "wallet",
            enhanced_swaps: &[],
            completed_trades: trades,
            open_positions: &[],
            window_start: ts(0),
            window_end: ts(90 * DAY),
            parsed_swap_count: trades.len() as u32,
            consistent: true,
        };
        MetricsCalculator::compute(&input, &MetricsConfig::default(), &QualityConfig::default())
    }

    #[test]
    fn test_empty_inputs_yield_empty_metrics() {
        let metrics = compute(&[]);
        assert_eq!(metrics.total_trades, 0);
        assert_eq!(metrics.net_roi_percent, 0.0);
        assert_eq!(metrics.sharpe_ratio, 0.0);
        assert_eq!(metrics.win_loss_ratio, 0.0);
    }

    #[test]
    fn test_net_roi_over_realized_basis() {
        let trades = vec![
            trade(0, DAY, dec!(1000), dec!(100)),
            trade(DAY, 2 * DAY, dec!(1000), dec!(-50)),
        ];
        let metrics = compute(&trades);

        assert_eq!(metrics.realized_pnl_usd, dec!(50));
        assert_eq!(metrics.total_cost_basis_usd, dec!(2000));
        assert!((metrics.net_roi_percent - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_monotonic_gains_have_zero_drawdown() {
        let trades: Vec<CompletedTrade> = (0..5)
            .map(|i| trade(i * DAY, (i + 1) * DAY, dec!(100), dec!(10)))
            .collect();

        let metrics = compute(&trades);
        assert_eq!(metrics.max_drawdown_percent, 0.0);
    }

    #[test]
    fn test_drawdown_measured_against_peak() {
        // Equity walk: 100, 150, 70, 50, 150, 200 => max dd 100 of peak 200
        let pnls = [
            dec!(100),
            dec!(50),
            dec!(-80),
            dec!(-20),
            dec!(100),
            dec!(50),
        ];
        let trades: Vec<CompletedTrade> = pnls
            .iter()
            .enumerate()
            .map(|(i, pnl)| trade(i as i64 * DAY, (i as i64 + 1) * DAY, dec!(500), *pnl))
            .collect();

        let metrics = compute(&trades);
        assert!((metrics.max_drawdown_percent - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_sharpe_requires_two_trading_days() {
        // All exits on one calendar day
        let trades = vec![
            trade(0, DAY, dec!(100), dec!(10)),
            trade(0, DAY + 3600, dec!(100), dec!(5)),
        ];
        let metrics = compute(&trades);
        assert_eq!(metrics.sharpe_ratio, 0.0);
    }

    #[test]
    fn test_sharpe_excludes_zero_investment_days() {
        // Two days of zero-basis trades plus one real day: still < 2
        let trades = vec![
            trade(0, DAY, dec!(0), dec!(10)),
            trade(DAY, 2 * DAY, dec!(0), dec!(10)),
            trade(2 * DAY, 3 * DAY, dec!(100), dec!(10)),
        ];
        let metrics = compute(&trades);
        assert_eq!(metrics.sharpe_ratio, 0.0);
    }

    #[test]
    fn test_sharpe_finite_for_varied_returns() {
        let trades = vec![
            trade(0, DAY, dec!(1000), dec!(30)),
            trade(DAY, 2 * DAY, dec!(1000), dec!(-10)),
            trade(2 * DAY, 3 * DAY, dec!(1000), dec!(20)),
            trade(3 * DAY, 4 * DAY, dec!(1000), dec!(5)),
        ];
        let metrics = compute(&trades);
        assert!(metrics.sharpe_ratio.is_finite());
        assert!(metrics.sharpe_ratio > 0.0);
    }

    #[test]
    fn test_all_wins_yield_sentinel_ratio() {
        let trades = vec![
            trade(0, DAY, dec!(100), dec!(10)),
            trade(DAY, 2 * DAY, dec!(100), dec!(20)),
        ];
        let metrics = compute(&trades);

        assert_eq!(metrics.winning_trades, 2);
        assert_eq!(metrics.losing_trades, 0);
        assert_eq!(metrics.win_loss_ratio, RATIO_SENTINEL);
        assert_eq!(metrics.profit_factor, RATIO_SENTINEL);
    }

    #[test]
    fn test_win_loss_counts_and_ratio() {
        let trades = vec![
            trade(0, DAY, dec!(100), dec!(10)),
            trade(DAY, 2 * DAY, dec!(100), dec!(-5)),
            trade(2 * DAY, 3 * DAY, dec!(100), dec!(20)),
            trade(3 * DAY, 4 * DAY, dec!(100), dec!(-10)),
            trade(4 * DAY, 5 * DAY, dec!(100), dec!(15)),
        ];
        let metrics = compute(&trades);

        assert_eq!(metrics.winning_trades, 3);
        assert_eq!(metrics.losing_trades, 2);
        assert!((metrics.win_loss_ratio - 1.5).abs() < 1e-9);
        assert!((metrics.win_rate - 0.6).abs() < 1e-9);
        assert_eq!(metrics.largest_win_usd, dec!(20));
        assert_eq!(metrics.largest_loss_usd, dec!(-10));
    }

    #[test]
    fn test_streaks() {
        let pnls = [
            dec!(10),
            dec!(10),
            dec!(10),
            dec!(-5),
            dec!(-5),
            dec!(10),
        ];
        let trades: Vec<CompletedTrade> = pnls
            .iter()
            .enumerate()
            .map(|(i, pnl)| trade(i as i64 * DAY, (i as i64 + 1) * DAY, dec!(100), *pnl))
            .collect();

        let metrics = compute(&trades);
        assert_eq!(metrics.max_win_streak, 3);
        assert_eq!(metrics.max_loss_streak, 2);
    }

    #[test]
    fn test_monthly_pnl_extremes() {
        // January: +100, February: -40
        let jan = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let feb = Utc.with_ymd_and_hms(2024, 2, 10, 0, 0, 0).unwrap();

        let trades = vec![
            trade(jan.timestamp() - DAY, jan.timestamp(), dec!(100), dec!(100)),
            trade(feb.timestamp() - DAY, feb.timestamp(), dec!(100), dec!(-40)),
        ];
        let metrics = compute(&trades);

        assert_eq!(metrics.best_month_pnl_usd, dec!(100));
        assert_eq!(metrics.worst_month_pnl_usd, dec!(-40));
    }

    #[test]
    fn test_unrealized_pnl_feeds_roi() {
        let mut position =
            TokenPosition::new("mint".to_string(), "TOK".to_string(), ts(0));
        position.push_lot(crate::models::PurchaseLot {
            amount: dec!(10),
            cost_basis_usd: dec!(1000),
            acquired_at: ts(0),
            signature: "sig".to_string(),
        });
        position.mark_to_market(dec!(110));

        let input = MetricsInput {
            wallet: "wallet",
            enhanced_swaps: &[],
            completed_trades: &[],
            open_positions: std::slice::from_ref(&position),
            window_start: ts(0),
            window_end: ts(90 * DAY),
            parsed_swap_count: 1,
            consistent: true,
        };
        let metrics = MetricsCalculator::compute(
            &input,
            &MetricsConfig::default(),
            &QualityConfig::default(),
        );

        assert_eq!(metrics.unrealized_pnl_usd, dec!(100));
        assert!((metrics.net_roi_percent - 10.0).abs() < 1e-9);
    }
}
