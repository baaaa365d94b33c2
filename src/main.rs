//! Wallet Trading Performance Analytics
//!
//! Reconstructs a Solana wallet's swap history, runs FIFO cost-basis
//! accounting at historical USD prices, and derives the risk/performance
//! metrics used to rank traders for a copy-trading bot.

mod analyzer;
mod api;
mod config;
mod db;
mod errors;
mod ledger;
mod metrics;
mod models;
mod parser;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::analyzer::Analyzer;
use crate::api::{HistoricalPriceClient, RateLimiter, RpcTransactionSource};
use crate::config::{AnalysisConfig, AnalyzerConfig};
use crate::db::Database;
use crate::models::{BatchPriority, BatchRequest, WalletAnalysisResult, WalletPerformanceMetrics};
use crate::parser::TokenRegistry;

/// Wallet performance analytics CLI.
#[derive(Parser)]
#[command(name = "wallet-analyzer")]
#[command(about = "Analyze Solana wallet trading performance for copy-trading", long_about = None)]
struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "sqlite:./wallet_analyzer.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Solana JSON-RPC endpoint
    #[arg(long, env = "SOLANA_RPC_URL", default_value = "https://api.mainnet-beta.solana.com")]
    rpc_url: String,

    /// Price API endpoint
    #[arg(long, env = "PRICE_API_URL", default_value = "https://public-api.birdeye.so")]
    price_url: String,

    /// Price API key
    #[arg(long, env = "PRICE_API_KEY")]
    price_api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a single wallet
    Analyze {
        /// Wallet address to analyze
        wallet: String,

        /// Window start (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        start: Option<String>,

        /// Window end (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        end: Option<String>,

        /// Maximum transactions to fetch
        #[arg(short, long)]
        max_transactions: Option<usize>,

        /// Minimum USD value per trade
        #[arg(long)]
        min_trade_value: Option<f64>,

        /// Only analyze these token mints (comma separated)
        #[arg(long, value_delimiter = ',')]
        include: Option<Vec<String>>,

        /// Exclude these token mints (comma separated)
        #[arg(long, value_delimiter = ',')]
        exclude: Option<Vec<String>>,

        /// Emit the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Analyze many wallets with bounded concurrency
    Batch {
        /// Wallet addresses
        wallets: Vec<String>,

        /// File with one wallet address per line
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Concurrent wallet analyses
        #[arg(short, long, default_value = "5")]
        concurrency: usize,

        /// Scheduling priority (low, normal, high)
        #[arg(long, default_value = "normal")]
        priority: String,

        /// Emit the full batch result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show stored metrics and recent runs for a wallet
    Stats {
        /// Wallet address
        wallet: String,
    },

    /// List the configured token allow-list
    Tokens,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let db = Database::new(&cli.database).await?;

    let engine_config = AnalyzerConfig::default();
    let limiter = Arc::new(RateLimiter::new(engine_config.requests_per_second));
    let registry = Arc::new(TokenRegistry::default());

    let transactions = Arc::new(
        RpcTransactionSource::new(cli.rpc_url.clone(), Arc::clone(&limiter))
            .context("Failed to create RPC client")?,
    );
    let prices = Arc::new(
        HistoricalPriceClient::new(
            cli.price_url.clone(),
            cli.price_api_key.clone(),
            Arc::clone(&limiter),
        )
        .context("Failed to create price client")?,
    );

    match cli.command {
        Commands::Analyze {
            wallet,
            start,
            end,
            max_transactions,
            min_trade_value,
            include,
            exclude,
            json,
        } => {
            validate_address(&wallet)?;

            let analysis_config = AnalysisConfig {
                start_date: start.as_deref().map(parse_date).transpose()?,
                end_date: end.as_deref().map(parse_date).transpose()?,
                max_transactions,
                min_trade_value_usd: min_trade_value.and_then(Decimal::from_f64_retain),
                include_tokens: include,
                exclude_tokens: exclude,
            };

            let engine = Analyzer::new(transactions, prices, registry, limiter, engine_config);
            let result = engine.analyze_wallet(&wallet, &analysis_config).await;

            db.record_run(None, &result).await?;
            if let Some(metrics) = &result.metrics {
                db.save_metrics(metrics).await?;
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&result);
            }
        }

        Commands::Batch {
            wallets,
            file,
            concurrency,
            priority,
            json,
        } => {
            let mut addresses = wallets;
            if let Some(path) = file {
                let contents = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                addresses.extend(
                    contents
                        .lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty() && !l.starts_with('#'))
                        .map(String::from),
                );
            }
            addresses.dedup();

            if addresses.is_empty() {
                bail!("No wallet addresses given. Pass them as arguments or via --file.");
            }
            for address in &addresses {
                validate_address(address)?;
            }

            info!(wallets = addresses.len(), "Submitting batch analysis");

            let engine_config = AnalyzerConfig {
                max_concurrent: concurrency,
                ..engine_config
            };
            let engine = Analyzer::new(transactions, prices, registry, limiter, engine_config);

            let batch = engine
                .analyze_batch(BatchRequest {
                    wallet_addresses: addresses,
                    config: AnalysisConfig::default(),
                    priority: parse_priority(&priority)?,
                })
                .await;

            let batch_id = batch.batch_id.to_string();
            for result in &batch.results {
                db.record_run(Some(&batch_id), result).await?;
                if let Some(metrics) = &result.metrics {
                    db.save_metrics(metrics).await?;
                }
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&batch)?);
            } else {
                print_batch(&batch);
            }
        }

        Commands::Stats { wallet } => {
            validate_address(&wallet)?;

            match db.latest_metrics(&wallet).await? {
                Some(stored) => {
                    println!("\n=== Wallet: {} ===", stored.wallet);
                    println!("Calculated: {}", stored.calculated_at);
                    println!("Window:     {} .. {}", stored.window_start, stored.window_end);

                    println!("\n--- Core Metrics ---");
                    println!("Net ROI:        {:.2}%", stored.net_roi_percent);
                    println!("Max Drawdown:   {:.2}%", stored.max_drawdown_percent);
                    println!("Sharpe Ratio:   {:.3}", stored.sharpe_ratio);
                    println!("Win/Loss Ratio: {:.2}", stored.win_loss_ratio);
                    println!("Total Trades:   {}", stored.total_trades);

                    println!("\n--- P&L ---");
                    println!("Realized P&L:   ${:.2}", stored.realized_pnl_usd);
                    println!("Unrealized P&L: ${:.2}", stored.unrealized_pnl_usd);
                    println!("Volume:         ${:.2}", stored.total_volume_usd);
                    println!("Fees:           ${:.2}", stored.total_fees_usd);

                    println!("\n--- Quality ---");
                    println!("Confidence:     {:.1}/100", stored.confidence_score);
                    println!("Tier:           {}", stored.data_quality);
                }
                None => {
                    println!(
                        "No stored metrics for {}. Run 'wallet-analyzer analyze {}' first.",
                        wallet, wallet
                    );
                }
            }

            let runs = db.recent_runs(&wallet, 10).await?;
            if !runs.is_empty() {
                println!("\n--- Recent Runs ---");
                println!(
                    "{:<26} {:<10} {:>6} {:>7} {:>11} {:>9}",
                    "ANALYZED", "STATUS", "SWAPS", "TRADES", "CONFIDENCE", "TIME(MS)"
                );
                for run in runs {
                    println!(
                        "{:<26} {:<10} {:>6} {:>7} {:>11.1} {:>9}",
                        truncate(&run.analyzed_at, 24),
                        run.status,
                        run.swap_count,
                        run.trade_count,
                        run.confidence_score,
                        run.processing_ms
                    );
                }
            }
        }

        Commands::Tokens => {
            println!("\n{:<46} {:<10} {:>9}", "MINT", "SYMBOL", "DECIMALS");
            println!("{}", "-".repeat(67));

            let mut entries: Vec<_> = registry.iter().collect();
            entries.sort_by(|a, b| a.1.symbol.cmp(&b.1.symbol));
            for (mint, meta) in entries {
                println!("{:<46} {:<10} {:>9}", mint, meta.symbol, meta.decimals);
            }
        }
    }

    Ok(())
}

/// Reject addresses that are not base58-encoded 32-byte keys.
fn validate_address(address: &str) -> Result<()> {
    let decoded = bs58::decode(address)
        .into_vec()
        .with_context(|| format!("'{}' is not valid base58", address))?;
    if decoded.len() != 32 {
        bail!("'{}' is not a valid Solana address", address);
    }
    Ok(())
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("'{}' is not YYYY-MM-DD or RFC 3339", raw))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .context("Invalid date")?;
    Ok(Utc.from_utc_datetime(&midnight))
}

fn parse_priority(raw: &str) -> Result<BatchPriority> {
    match raw.to_lowercase().as_str() {
        "low" => Ok(BatchPriority::Low),
        "normal" => Ok(BatchPriority::Normal),
        "high" => Ok(BatchPriority::High),
        other => bail!("Unknown priority '{}'. Use low, normal, or high.", other),
    }
}

fn print_result(result: &WalletAnalysisResult) {
    println!("\n=== Wallet: {} ===", result.wallet);
    println!("Status:       {}", result.status.as_str());
    println!("Transactions: {}", result.transaction_count);
    println!("Swaps:        {} ({} priced)", result.swap_count, result.priced_swap_count);
    println!("Trades:       {}", result.trade_count);
    println!("Elapsed:      {}ms", result.processing_ms);

    if let Some(metrics) = &result.metrics {
        print_metrics(metrics);
    }

    if !result.open_positions.is_empty() {
        println!("\n--- Open Positions ({}) ---", result.open_positions.len());
        for position in &result.open_positions {
            println!(
                "  {:<10} {:>16.6} @ avg ${:<12.4} (P&L: ${:.2})",
                position.symbol,
                position.total_amount,
                position.average_cost_usd(),
                position.unrealized_pnl_usd
            );
        }
    }

    if !result.warnings.is_empty() {
        println!("\n--- Warnings ---");
        for warning in &result.warnings {
            println!("  ! {}", warning);
        }
    }

    if !result.errors.is_empty() {
        println!("\n--- Errors ({}) ---", result.errors.len());
        for error in result.errors.iter().take(10) {
            println!("  [{}] {}", error.kind(), error);
        }
        if result.errors.len() > 10 {
            println!("  ... and {} more", result.errors.len() - 10);
        }
    }
}

fn print_metrics(metrics: &WalletPerformanceMetrics) {
    println!("\n--- Core Metrics ---");
    println!("Net ROI:        {:.2}%", metrics.net_roi_percent);
    println!("Max Drawdown:   {:.2}%", metrics.max_drawdown_percent);
    println!("Sharpe Ratio:   {:.3}", metrics.sharpe_ratio);
    println!("Win/Loss Ratio: {:.2}", metrics.win_loss_ratio);
    println!("Total Trades:   {}", metrics.total_trades);

    println!("\n--- Win/Loss ---");
    println!("Win Rate:       {:.1}%", metrics.win_rate * 100.0);
    println!("Winners:        {}", metrics.winning_trades);
    println!("Losers:         {}", metrics.losing_trades);
    println!("Largest Win:    ${:.2}", metrics.largest_win_usd);
    println!("Largest Loss:   ${:.2}", metrics.largest_loss_usd);
    println!("Profit Factor:  {:.2}", metrics.profit_factor);

    println!("\n--- P&L ---");
    println!("Realized:       ${:.2}", metrics.realized_pnl_usd);
    println!("Unrealized:     ${:.2}", metrics.unrealized_pnl_usd);
    println!("Volume:         ${:.2}", metrics.total_volume_usd);
    println!("Fees:           ${:.2}", metrics.total_fees_usd);
    println!("Avg Trade:      ${:.2}", metrics.average_trade_size_usd);
    println!("Avg Hold:       {:.1} days", metrics.average_holding_period_days);

    println!("\n--- Risk ---");
    println!("Volatility:     {:.2}", metrics.volatility);
    println!("VaR (5%):       {:.2}%", metrics.value_at_risk_5pct);
    println!("Calmar Ratio:   {:.2}", metrics.calmar_ratio);
    println!("Best Month:     ${:.2}", metrics.best_month_pnl_usd);
    println!("Worst Month:    ${:.2}", metrics.worst_month_pnl_usd);
    println!("Win Streak:     {}", metrics.max_win_streak);
    println!("Loss Streak:    {}", metrics.max_loss_streak);

    println!("\n--- Quality ---");
    println!("Price Coverage: {:.0}%", metrics.price_coverage * 100.0);
    println!("Confidence:     {:.1}/100", metrics.confidence_score);
    println!("Tier:           {}", metrics.data_quality.as_str());
}

fn print_batch(batch: &crate::models::BatchAnalysisResult) {
    println!("\n=== Batch {} ===", batch.batch_id);
    println!(
        "Wallets: {} ({} completed, {} partial, {} failed)",
        batch.results.len(),
        batch.completed_count,
        batch.partial_count,
        batch.failed_count
    );
    println!(
        "Elapsed: {}ms total, {}ms avg per wallet",
        batch.total_processing_ms, batch.average_processing_ms
    );

    println!(
        "\n{:<44} {:<10} {:>7} {:>9} {:>8} {:>11}",
        "WALLET", "STATUS", "TRADES", "ROI%", "SHARPE", "CONFIDENCE"
    );
    println!("{}", "-".repeat(94));

    for result in &batch.results {
        let (roi, sharpe, confidence) = result
            .metrics
            .as_ref()
            .map(|m| (m.net_roi_percent, m.sharpe_ratio, m.confidence_score))
            .unwrap_or((0.0, 0.0, 0.0));

        println!(
            "{:<44} {:<10} {:>7} {:>9.2} {:>8.2} {:>11.1}",
            truncate(&result.wallet, 44),
            result.status.as_str(),
            result.trade_count,
            roi,
            sharpe,
            confidence
        );
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}..", &s[..max.saturating_sub(2)])
    }
}
