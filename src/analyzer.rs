//! Orchestrator: runs the fetch → parse → ledger → metrics pipeline for one
//! wallet, and fans out across many wallets with bounded concurrency.
//!
//! Isolation is the contract here: a wallet's failure is converted into its
//! own `failed` result and never aborts or blocks sibling analyses.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::api::{PriceSource, RateLimiter, TransactionSource};
use crate::config::{AnalysisConfig, AnalyzerConfig};
use crate::errors::AnalysisError;
use crate::ledger::PositionLedger;
use crate::metrics::{MetricsCalculator, MetricsInput};
use crate::models::{
    AnalysisStatus, BatchAnalysisResult, BatchRequest, Swap, WalletAnalysisResult,
    WalletPerformanceMetrics,
};
use crate::parser::{SwapParser, TokenRegistry};

/// Wallet analytics engine. Stateless between runs: each call constructs
/// its own parser and ledger and discards them with the result.
#[derive(Clone)]
pub struct Analyzer {
    transactions: Arc<dyn TransactionSource>,
    prices: Arc<dyn PriceSource>,
    registry: Arc<TokenRegistry>,
    limiter: Arc<RateLimiter>,
    config: AnalyzerConfig,
}

impl Analyzer {
    pub fn new(
        transactions: Arc<dyn TransactionSource>,
        prices: Arc<dyn PriceSource>,
        registry: Arc<TokenRegistry>,
        limiter: Arc<RateLimiter>,
        config: AnalyzerConfig,
    ) -> Self {
        Self {
            transactions,
            prices,
            registry,
            limiter,
            config,
        }
    }

    /// Analyze one wallet under the configured time budget.
    ///
    /// Always returns a result object; fetch failures, timeouts, and
    /// unexpected internal errors all land in `status: failed`.
    pub async fn analyze_wallet(&self, wallet: &str, config: &AnalysisConfig) -> WalletAnalysisResult {
        let started = Instant::now();
        info!(wallet = %wallet, "Starting wallet analysis");

        let budget = self.config.wallet_timeout();
        let result = match timeout(budget, self.run_pipeline(wallet, config, &started)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(wallet = %wallet, budget_secs = self.config.wallet_timeout_secs, "Wallet analysis timed out");
                WalletAnalysisResult::failed(
                    wallet.to_string(),
                    AnalysisError::Timeout {
                        wallet: wallet.to_string(),
                        budget_secs: self.config.wallet_timeout_secs,
                    },
                    started.elapsed().as_millis() as u64,
                )
            }
        };

        info!(
            wallet = %wallet,
            status = result.status.as_str(),
            swaps = result.swap_count,
            trades = result.trade_count,
            errors = result.errors.len(),
            elapsed_ms = result.processing_ms,
            "Wallet analysis finished"
        );

        result
    }

    /// Pipeline wrapper that converts any escaping error into a `failed`
    /// result so nothing propagates to the batch scheduler.
    async fn run_pipeline(
        &self,
        wallet: &str,
        config: &AnalysisConfig,
        started: &Instant,
    ) -> WalletAnalysisResult {
        match self.run_stages(wallet, config).await {
            Ok(mut result) => {
                result.processing_ms = started.elapsed().as_millis() as u64;
                result
            }
            Err(e) => {
                error!(wallet = %wallet, error = %e, "Wallet analysis failed");
                WalletAnalysisResult::failed(
                    wallet.to_string(),
                    e,
                    started.elapsed().as_millis() as u64,
                )
            }
        }
    }

    async fn run_stages(
        &self,
        wallet: &str,
        config: &AnalysisConfig,
    ) -> Result<WalletAnalysisResult, AnalysisError> {
        let mut errors: Vec<AnalysisError> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();

        // Stage 1: signature list, capped and window-filtered
        let limit = config
            .max_transactions
            .unwrap_or(self.config.default_max_transactions);
        let signatures = self.transactions.list_signatures(wallet, limit).await?;

        if signatures.is_empty() {
            return Ok(Self::terminal_failure(
                wallet,
                errors,
                AnalysisError::fetch("rpc", format!("no transactions found for {}", wallet)),
            ));
        }

        let wanted: Vec<String> = signatures
            .iter()
            .filter(|s| s.err.is_none())
            .filter(|s| match s.block_time {
                Some(t) => Self::in_window(t, config),
                None => true,
            })
            .map(|s| s.signature.clone())
            .collect();

        // Stage 2: transaction bodies (partial results tolerated)
        let transactions = self.transactions.fetch_transactions(&wanted).await?;
        let transaction_count = transactions.len() as u32;

        // Stage 3: parse
        let parser = SwapParser::new(self.registry.clone());
        let (mut swaps, parse_errors) = parser.parse_batch(&transactions, wallet);
        errors.extend(parse_errors);

        // Stage 4: request-level filters
        swaps.retain(|s| Self::in_window(s.block_time.timestamp(), config));
        swaps.retain(|s| {
            config.mint_allowed(&s.token_in.mint) && config.mint_allowed(&s.token_out.mint)
        });
        swaps.sort_by(|a, b| {
            a.block_time
                .cmp(&b.block_time)
                .then_with(|| a.signature.cmp(&b.signature))
        });
        if config.min_trade_value_usd.is_some() {
            swaps = self.filter_min_value(swaps, config).await;
        }

        if swaps.is_empty() {
            return Ok(Self::terminal_failure(
                wallet,
                errors,
                AnalysisError::fetch("rpc", format!("no valid swaps found for {}", wallet)),
            ));
        }

        let swap_count = swaps.len() as u32;
        let window_end = config.end_date.unwrap_or_else(Utc::now);
        let window_start = config
            .start_date
            .or_else(|| swaps.first().map(|s| s.block_time))
            .unwrap_or(window_end);

        // Stage 5: FIFO position ledger
        let mut ledger = PositionLedger::new(wallet, self.registry.clone());
        ledger.process(&swaps, self.prices.as_ref()).await;
        ledger.mark_positions(self.prices.as_ref(), window_end).await;
        let outcome = ledger.into_outcome();
        errors.extend(outcome.errors);

        if outcome.untracked_sell_count > 0 {
            warnings.push(format!(
                "{} disposal(s) exceeded tracked positions and were assigned zero cost basis",
                outcome.untracked_sell_count
            ));
        }

        let consistent = !errors.iter().any(|e| e.kind() == "calculation");

        // Stage 6: metrics
        let input = MetricsInput {
            wallet,
            enhanced_swaps: &outcome.enhanced_swaps,
            completed_trades: &outcome.completed_trades,
            open_positions: &outcome.open_positions,
            window_start,
            window_end,
            parsed_swap_count: swap_count,
            consistent,
        };
        let metrics =
            MetricsCalculator::compute(&input, &self.config.metrics, &self.config.quality);

        // Stage 7: range-sanity validation
        self.validate_metrics(&metrics, outcome.completed_trades.len(), &mut warnings);

        let status = if metrics.total_trades >= self.config.min_completed_trades {
            AnalysisStatus::Completed
        } else {
            AnalysisStatus::Partial
        };

        Ok(WalletAnalysisResult {
            wallet: wallet.to_string(),
            status,
            metrics: Some(metrics),
            open_positions: outcome.open_positions,
            transaction_count,
            swap_count,
            priced_swap_count: outcome.enhanced_swaps.len() as u32,
            trade_count: outcome.completed_trades.len() as u32,
            errors,
            warnings,
            processing_ms: 0,
            analyzed_at: Utc::now(),
        })
    }

    /// Drop swaps whose disposal leg is worth less than the configured
    /// minimum. Swaps that cannot be valued are kept; the ledger decides
    /// their fate.
    async fn filter_min_value(&self, swaps: Vec<Swap>, config: &AnalysisConfig) -> Vec<Swap> {
        let Some(min_value) = config.min_trade_value_usd else {
            return swaps;
        };

        let mut kept = Vec::with_capacity(swaps.len());
        for swap in swaps {
            match self
                .prices
                .price_at(&swap.token_in.mint, swap.block_time)
                .await
            {
                Ok(Some(price)) if swap.token_in.amount() * price < min_value => {
                    debug!(signature = %swap.signature, "Swap below minimum trade value, dropped");
                }
                _ => kept.push(swap),
            }
        }
        kept
    }

    fn in_window(unix_secs: i64, config: &AnalysisConfig) -> bool {
        if let Some(start) = config.start_date {
            if unix_secs < start.timestamp() {
                return false;
            }
        }
        if let Some(end) = config.end_date {
            if unix_secs > end.timestamp() {
                return false;
            }
        }
        true
    }

    /// Range-sanity checks; findings become warnings, never hard failures.
    fn validate_metrics(
        &self,
        metrics: &WalletPerformanceMetrics,
        expected_trades: usize,
        warnings: &mut Vec<String>,
    ) {
        if metrics.net_roi_percent.abs() > self.config.roi_sanity_limit {
            warnings.push(format!(
                "net ROI {:.1}% exceeds sanity limit of {:.0}%",
                metrics.net_roi_percent, self.config.roi_sanity_limit
            ));
        }
        if metrics.max_drawdown_percent > 100.0 + f64::EPSILON {
            warnings.push(format!(
                "max drawdown {:.1}% exceeds 100%",
                metrics.max_drawdown_percent
            ));
        }
        if metrics.total_trades as usize != expected_trades {
            warnings.push(format!(
                "trade count mismatch: metrics report {} but ledger produced {}",
                metrics.total_trades, expected_trades
            ));
        }
        if metrics.winning_trades + metrics.losing_trades > metrics.total_trades {
            warnings.push("win/loss counts exceed total trades".to_string());
        }
    }

    fn terminal_failure(
        wallet: &str,
        mut errors: Vec<AnalysisError>,
        cause: AnalysisError,
    ) -> WalletAnalysisResult {
        errors.push(cause);
        WalletAnalysisResult {
            wallet: wallet.to_string(),
            status: AnalysisStatus::Failed,
            metrics: None,
            open_positions: Vec::new(),
            transaction_count: 0,
            swap_count: 0,
            priced_swap_count: 0,
            trade_count: 0,
            errors,
            warnings: Vec::new(),
            processing_ms: 0,
            analyzed_at: Utc::now(),
        }
    }

    /// Analyze many wallets under a global concurrency cap and rate limit.
    ///
    /// Every wallet reaches a terminal state before the aggregate is
    /// produced; task panics are caught at the join and converted into
    /// `failed` results.
    pub async fn analyze_batch(&self, request: BatchRequest) -> BatchAnalysisResult {
        let batch_id = Uuid::new_v4();
        let started_at = Utc::now();
        let started = Instant::now();

        info!(
            batch_id = %batch_id,
            wallets = request.wallet_addresses.len(),
            max_concurrent = self.config.max_concurrent,
            "Starting batch analysis"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let mut handles = Vec::with_capacity(request.wallet_addresses.len());

        for wallet in &request.wallet_addresses {
            let analyzer = self.clone();
            let config = request.config.clone();
            let wallet = wallet.clone();
            let semaphore = Arc::clone(&semaphore);

            let task_wallet = wallet.clone();
            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return WalletAnalysisResult::failed(
                            task_wallet.clone(),
                            AnalysisError::Calculation {
                                wallet: task_wallet,
                                detail: "batch scheduler shut down".to_string(),
                            },
                            0,
                        )
                    }
                };
                analyzer.limiter.acquire().await;
                analyzer.analyze_wallet(&task_wallet, &config).await
            });

            handles.push((wallet, handle));
        }

        // Wait for every unit to reach a terminal state before aggregating
        let (wallets, joins): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let outcomes = futures::future::join_all(joins).await;

        let mut results = Vec::with_capacity(wallets.len());
        for (wallet, outcome) in wallets.into_iter().zip(outcomes) {
            match outcome {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!(wallet = %wallet, error = %e, "Analysis task aborted");
                    results.push(WalletAnalysisResult::failed(
                        wallet.clone(),
                        AnalysisError::Calculation {
                            wallet,
                            detail: format!("analysis task aborted: {}", e),
                        },
                        0,
                    ));
                }
            }
        }

        let batch = BatchAnalysisResult::from_results(
            batch_id,
            request.priority,
            results,
            started_at,
            started.elapsed().as_millis() as u64,
        );

        info!(
            batch_id = %batch_id,
            completed = batch.completed_count,
            partial = batch.partial_count,
            failed = batch.failed_count,
            elapsed_ms = batch.total_processing_ms,
            "Batch analysis finished"
        );

        batch
    }
}
