//! Position ledger: FIFO cost-basis accounting over an ordered swap stream.
//!
//! One ledger instance lives for exactly one analysis run. Swaps must
//! arrive in timestamp order; the disposal leg consumes open lots oldest
//! first, the acquisition leg appends a new lot, and every mutation is
//! followed by a totals reconciliation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::api::PriceSource;
use crate::errors::AnalysisError;
use crate::models::{
    CompletedTrade, EnhancedSwap, PurchaseLot, Swap, TokenPosition, EPSILON,
};
use crate::parser::{TokenRegistry, WSOL_MINT};

/// Everything a ledger run produced.
pub struct LedgerOutcome {
    pub enhanced_swaps: Vec<EnhancedSwap>,
    pub completed_trades: Vec<CompletedTrade>,
    pub open_positions: Vec<TokenPosition>,
    pub errors: Vec<AnalysisError>,

    /// Disposals (or parts of them) that had no tracked cost basis
    pub untracked_sell_count: u32,
}

/// Per-run FIFO position ledger for one wallet.
pub struct PositionLedger {
    wallet: String,
    registry: Arc<TokenRegistry>,
    positions: HashMap<String, TokenPosition>,
    enhanced_swaps: Vec<EnhancedSwap>,
    completed_trades: Vec<CompletedTrade>,
    errors: Vec<AnalysisError>,
    untracked_sell_count: u32,
}

impl PositionLedger {
    pub fn new(wallet: &str, registry: Arc<TokenRegistry>) -> Self {
        Self {
            wallet: wallet.to_string(),
            registry,
            positions: HashMap::new(),
            enhanced_swaps: Vec::new(),
            completed_trades: Vec::new(),
            errors: Vec::new(),
            untracked_sell_count: 0,
        }
    }

    /// Process a chronologically-sorted swap stream.
    ///
    /// An out-of-order input is a caller bug; it is recorded as a
    /// calculation error and the stream is re-sorted before processing so
    /// the FIFO semantics stay well-defined.
    pub async fn process(&mut self, swaps: &[Swap], prices: &dyn PriceSource) {
        let ordered = swaps.windows(2).all(|w| w[0].block_time <= w[1].block_time);

        if ordered {
            for swap in swaps {
                self.process_swap(swap, prices).await;
            }
        } else {
            self.errors.push(AnalysisError::Calculation {
                wallet: self.wallet.clone(),
                detail: "swap stream arrived out of timestamp order".to_string(),
            });
            let mut sorted: Vec<&Swap> = swaps.iter().collect();
            sorted.sort_by(|a, b| {
                a.block_time
                    .cmp(&b.block_time)
                    .then_with(|| a.signature.cmp(&b.signature))
            });
            for swap in sorted {
                self.process_swap(swap, prices).await;
            }
        }
    }

    async fn process_swap(&mut self, swap: &Swap, prices: &dyn PriceSource) {
        // Price both legs at the historical timestamp; a missing price
        // degrades this swap only.
        let Some(in_price) = self.lookup_price(prices, &swap.token_in.mint, swap.block_time).await
        else {
            return;
        };
        let Some(out_price) = self
            .lookup_price(prices, &swap.token_out.mint, swap.block_time)
            .await
        else {
            return;
        };

        let sale_amount = swap.token_in.amount();
        let acquired_amount = swap.token_out.amount();
        let token_in_value = sale_amount * in_price;
        let token_out_value = acquired_amount * out_price;

        let realized = self.apply_disposal(swap, sale_amount, in_price);
        self.apply_acquisition(swap, acquired_amount, token_out_value);

        // Relative value lost between the legs; negative deviations are
        // price noise, not slippage.
        let slippage_pct = if token_in_value > Decimal::ZERO {
            ((token_in_value - token_out_value) / token_in_value * Decimal::ONE_HUNDRED)
                .to_f64()
                .unwrap_or(0.0)
                .max(0.0)
        } else {
            0.0
        };

        let fee_usd = self
            .fee_in_usd(swap, in_price, out_price, prices)
            .await;

        self.enhanced_swaps.push(EnhancedSwap {
            swap: swap.clone(),
            token_in_price_usd: in_price,
            token_out_price_usd: out_price,
            token_in_value_usd: token_in_value,
            token_out_value_usd: token_out_value,
            realized_pnl_usd: realized,
            slippage_pct,
            fee_usd,
        });

        if let Err(e) = self.validate() {
            self.errors.push(e);
        }
    }

    /// FIFO-consume the disposal leg, emitting one trade per lot consumed.
    fn apply_disposal(&mut self, swap: &Swap, sale_amount: Decimal, sale_price: Decimal) -> Decimal {
        let mint = &swap.token_in.mint;
        let symbol = self.registry.symbol_for(mint);
        let mut realized = Decimal::ZERO;
        let mut covered = Decimal::ZERO;

        if let Some(position) = self.positions.get_mut(mint) {
            for lot in position.consume(sale_amount, swap.block_time) {
                covered += lot.amount;
                let trade = CompletedTrade::new(
                    mint.clone(),
                    symbol.clone(),
                    lot.acquired_at,
                    swap.block_time,
                    lot.entry_price_usd,
                    sale_price,
                    lot.amount,
                    lot.cost_basis_usd,
                    lot.amount * sale_price,
                    lot.entry_signature,
                    swap.signature.clone(),
                );
                realized += trade.realized_pnl_usd;
                self.completed_trades.push(trade);
            }

            if position.is_empty() {
                self.positions.remove(mint);
            }
        }

        // Sale exceeded tracked holdings: the remainder gets zero cost
        // basis, so the entire proceeds count as realized gain.
        let uncovered = sale_amount - covered;
        if uncovered > EPSILON {
            warn!(
                wallet = %self.wallet,
                mint = %mint,
                amount = %uncovered,
                signature = %swap.signature,
                "Disposal exceeds tracked position; applying zero cost basis"
            );
            self.untracked_sell_count += 1;

            let trade = CompletedTrade::new(
                mint.clone(),
                symbol,
                swap.block_time,
                swap.block_time,
                Decimal::ZERO,
                sale_price,
                uncovered,
                Decimal::ZERO,
                uncovered * sale_price,
                swap.signature.clone(),
                swap.signature.clone(),
            );
            realized += trade.realized_pnl_usd;
            self.completed_trades.push(trade);
        }

        realized
    }

    /// Append the acquisition leg as a new FIFO lot.
    fn apply_acquisition(&mut self, swap: &Swap, amount: Decimal, cost_usd: Decimal) {
        let mint = &swap.token_out.mint;
        let position = self.positions.entry(mint.clone()).or_insert_with(|| {
            TokenPosition::new(
                mint.clone(),
                self.registry.symbol_for(mint),
                swap.block_time,
            )
        });

        position.push_lot(PurchaseLot {
            amount,
            cost_basis_usd: cost_usd,
            acquired_at: swap.block_time,
            signature: swap.signature.clone(),
        });
    }

    /// Price lookup that records unavailability instead of failing.
    async fn lookup_price(
        &mut self,
        prices: &dyn PriceSource,
        mint: &str,
        timestamp: DateTime<Utc>,
    ) -> Option<Decimal> {
        match prices.price_at(mint, timestamp).await {
            Ok(Some(price)) => Some(price),
            Ok(None) => {
                self.errors.push(AnalysisError::PriceUnavailable {
                    mint: mint.to_string(),
                    timestamp,
                });
                None
            }
            Err(e) => {
                self.errors.push(e);
                None
            }
        }
    }

    /// Network fee converted at the SOL price for the swap timestamp.
    ///
    /// Reuses a leg price when a leg already is wrapped SOL; an
    /// unavailable SOL price zeroes the fee rather than dropping the swap.
    async fn fee_in_usd(
        &mut self,
        swap: &Swap,
        in_price: Decimal,
        out_price: Decimal,
        prices: &dyn PriceSource,
    ) -> Decimal {
        let sol_price = if swap.token_in.mint == WSOL_MINT {
            Some(in_price)
        } else if swap.token_out.mint == WSOL_MINT {
            Some(out_price)
        } else {
            match prices.price_at(WSOL_MINT, swap.block_time).await {
                Ok(price) => price,
                Err(_) => None,
            }
        };

        match sol_price {
            Some(price) => swap.fee_sol() * price,
            None => {
                debug!(signature = %swap.signature, "No SOL price for fee conversion");
                Decimal::ZERO
            }
        }
    }

    /// Reconcile every open position's cached totals against its lots.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        for (mint, position) in &self.positions {
            if let Err((amount_delta, cost_delta)) = position.reconcile() {
                return Err(AnalysisError::Calculation {
                    wallet: self.wallet.clone(),
                    detail: format!(
                        "position {} out of balance: amount drift {}, cost drift {}",
                        mint, amount_delta, cost_delta
                    ),
                });
            }
        }
        Ok(())
    }

    /// Mark every open position against prices at `at`.
    pub async fn mark_positions(&mut self, prices: &dyn PriceSource, at: DateTime<Utc>) {
        let mints: Vec<String> = self.positions.keys().cloned().collect();
        for mint in mints {
            match prices.price_at(&mint, at).await {
                Ok(Some(price)) => {
                    if let Some(position) = self.positions.get_mut(&mint) {
                        position.mark_to_market(price);
                    }
                }
                Ok(None) => {
                    self.errors.push(AnalysisError::PriceUnavailable {
                        mint: mint.clone(),
                        timestamp: at,
                    });
                }
                Err(e) => self.errors.push(e),
            }
        }
    }

    pub fn open_position_count(&self) -> usize {
        self.positions.len()
    }

    /// Consume the ledger, returning everything it produced.
    pub fn into_outcome(mut self) -> LedgerOutcome {
        let mut open_positions: Vec<TokenPosition> = self.positions.drain().map(|(_, p)| p).collect();
        open_positions.sort_by(|a, b| a.mint.cmp(&b.mint));

        LedgerOutcome {
            enhanced_swaps: self.enhanced_swaps,
            completed_trades: self.completed_trades,
            open_positions,
            errors: self.errors,
            untracked_sell_count: self.untracked_sell_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SwapKind, TokenLeg};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    const WALLET: &str = "wallet";
    const SOL_DECIMALS: u8 = 9;
    const TOK: &str = "4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R"; // RAY
    const TOK_DECIMALS: u8 = 6;
    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    /// Price source with per-(mint, timestamp) overrides and per-mint
    /// defaults; anything else is unavailable.
    struct FixedPrices {
        exact: HashMap<(String, i64), Decimal>,
        defaults: HashMap<String, Decimal>,
    }

    impl FixedPrices {
        fn new() -> Self {
            Self {
                exact: HashMap::new(),
                defaults: HashMap::new(),
            }
        }

        fn with_default(mut self, mint: &str, price: Decimal) -> Self {
            self.defaults.insert(mint.to_string(), price);
            self
        }

        fn with_price_at(mut self, mint: &str, secs: i64, price: Decimal) -> Self {
            self.exact.insert((mint.to_string(), secs), price);
            self
        }
    }

    #[async_trait]
    impl PriceSource for FixedPrices {
        async fn price_at(
            &self,
            mint: &str,
            timestamp: DateTime<Utc>,
        ) -> Result<Option<Decimal>, AnalysisError> {
            let key = (mint.to_string(), timestamp.timestamp());
            Ok(self
                .exact
                .get(&key)
                .or_else(|| self.defaults.get(mint))
                .copied())
        }
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn raw(amount: Decimal, decimals: u8) -> u64 {
        (amount * Decimal::from(10u64.pow(decimals as u32)))
            .to_u64()
            .unwrap()
    }

    fn swap(
        sig: &str,
        secs: i64,
        in_mint: &str,
        in_amount: Decimal,
        in_decimals: u8,
        out_mint: &str,
        out_amount: Decimal,
        out_decimals: u8,
    ) -> Swap {
        Swap {
            signature: sig.to_string(),
            wallet: WALLET.to_string(),
            block_time: ts(secs),
            token_in: TokenLeg {
                mint: in_mint.to_string(),
                raw_amount: raw(in_amount, in_decimals),
                decimals: in_decimals,
            },
            token_out: TokenLeg {
                mint: out_mint.to_string(),
                raw_amount: raw(out_amount, out_decimals),
                decimals: out_decimals,
            },
            fee_lamports: 5_000,
            pool: "pool".to_string(),
            venue: "raydium".to_string(),
            kind: SwapKind::SwapBaseIn,
        }
    }

    fn ledger() -> PositionLedger {
        PositionLedger::new(WALLET, Arc::new(TokenRegistry::default()))
    }

    #[tokio::test]
    async fn test_buy_then_sell_realizes_price_move() {
        // Buy 10 SOL at $100 (spend 1000 USDC), later sell all 10 at $110
        let prices = FixedPrices::new()
            .with_default(USDC, dec!(1))
            .with_price_at(WSOL_MINT, 100, dec!(100))
            .with_price_at(WSOL_MINT, 200, dec!(110));

        let swaps = vec![
            swap("buy", 100, USDC, dec!(1000), 6, WSOL_MINT, dec!(10), SOL_DECIMALS),
            swap("sell", 200, WSOL_MINT, dec!(10), SOL_DECIMALS, USDC, dec!(1100), 6),
        ];

        let mut ledger = ledger();
        ledger.process(&swaps, &prices).await;
        let outcome = ledger.into_outcome();

        // The buy consumed USDC with no tracked basis (untracked inflow);
        // the SOL round trip is the trade under test.
        let sol_trades: Vec<_> = outcome
            .completed_trades
            .iter()
            .filter(|t| t.mint == WSOL_MINT)
            .collect();
        assert_eq!(sol_trades.len(), 1);
        assert_eq!(sol_trades[0].realized_pnl_usd, dec!(100));
        assert!((sol_trades[0].roi_percent - 10.0).abs() < 1e-9);

        // SOL position fully closed; the USDC bought back remains open
        assert!(outcome.open_positions.iter().all(|p| p.mint != WSOL_MINT));
    }

    #[tokio::test]
    async fn test_fifo_across_two_lots() {
        // Buy 5 at $10, buy 5 at $20, then sell 7
        let prices = FixedPrices::new()
            .with_default(USDC, dec!(1))
            .with_price_at(TOK, 100, dec!(10))
            .with_price_at(TOK, 200, dec!(20))
            .with_price_at(TOK, 300, dec!(20));

        let swaps = vec![
            swap("buy1", 100, USDC, dec!(50), 6, TOK, dec!(5), TOK_DECIMALS),
            swap("buy2", 200, USDC, dec!(100), 6, TOK, dec!(5), TOK_DECIMALS),
            swap("sell", 300, TOK, dec!(7), TOK_DECIMALS, USDC, dec!(140), 6),
        ];

        let mut ledger = ledger();
        ledger.process(&swaps, &prices).await;
        let outcome = ledger.into_outcome();

        let tok_trades: Vec<_> = outcome
            .completed_trades
            .iter()
            .filter(|t| t.mint == TOK)
            .collect();
        assert_eq!(tok_trades.len(), 2);

        // First trade consumes the full 5-unit $10 lot
        assert_eq!(tok_trades[0].quantity, dec!(5));
        assert_eq!(tok_trades[0].entry_price_usd, dec!(10));
        assert_eq!(tok_trades[0].entry_signature, "buy1");
        assert_eq!(tok_trades[0].realized_pnl_usd, dec!(50));

        // Second consumes 2 units of the $20 lot
        assert_eq!(tok_trades[1].quantity, dec!(2));
        assert_eq!(tok_trades[1].entry_price_usd, dec!(20));
        assert_eq!(tok_trades[1].entry_signature, "buy2");
        assert_eq!(tok_trades[1].realized_pnl_usd, dec!(0));

        // 3 units at $20 remain open
        let tok_pos = outcome
            .open_positions
            .iter()
            .find(|p| p.mint == TOK)
            .unwrap();
        assert_eq!(tok_pos.total_amount, dec!(3));
        assert_eq!(tok_pos.total_cost_basis_usd, dec!(60));
    }

    #[tokio::test]
    async fn test_untracked_disposal_gets_zero_cost_basis() {
        let prices = FixedPrices::new()
            .with_default(USDC, dec!(1))
            .with_default(TOK, dec!(5));

        // Sell 10 TOK never bought through a tracked swap
        let swaps = vec![swap("sell", 100, TOK, dec!(10), TOK_DECIMALS, USDC, dec!(50), 6)];

        let mut ledger = ledger();
        ledger.process(&swaps, &prices).await;
        let outcome = ledger.into_outcome();

        assert_eq!(outcome.untracked_sell_count, 1);
        let trade = outcome
            .completed_trades
            .iter()
            .find(|t| t.mint == TOK)
            .unwrap();
        assert_eq!(trade.entry_value_usd, dec!(0));
        // Entire proceeds are realized gain
        assert_eq!(trade.realized_pnl_usd, dec!(50));
        assert_eq!(trade.roi_percent, 0.0);
    }

    #[tokio::test]
    async fn test_missing_price_skips_swap_only() {
        let unknown = "Unpriced1111111111111111111111111111111111";
        let prices = FixedPrices::new()
            .with_default(USDC, dec!(1))
            .with_default(WSOL_MINT, dec!(100));

        let swaps = vec![
            swap("bad", 100, USDC, dec!(50), 6, unknown, dec!(5), 6),
            swap("good", 200, USDC, dec!(1000), 6, WSOL_MINT, dec!(10), SOL_DECIMALS),
        ];

        let mut ledger = ledger();
        ledger.process(&swaps, &prices).await;
        let outcome = ledger.into_outcome();

        assert_eq!(outcome.enhanced_swaps.len(), 1);
        assert_eq!(outcome.enhanced_swaps[0].swap.signature, "good");
        assert!(outcome
            .errors
            .iter()
            .any(|e| e.kind() == "price_unavailable"));
    }

    #[tokio::test]
    async fn test_totals_reconcile_after_every_swap() {
        let prices = FixedPrices::new()
            .with_default(USDC, dec!(1))
            .with_default(TOK, dec!(10));

        let swaps = vec![
            swap("buy1", 100, USDC, dec!(50), 6, TOK, dec!(5), TOK_DECIMALS),
            swap("sell1", 200, TOK, dec!(2), TOK_DECIMALS, USDC, dec!(20), 6),
            swap("buy2", 300, USDC, dec!(30), 6, TOK, dec!(3), TOK_DECIMALS),
        ];

        let mut ledger = ledger();
        ledger.process(&swaps, &prices).await;

        assert!(ledger.validate().is_ok());
        let outcome = ledger.into_outcome();
        assert!(!outcome.errors.iter().any(|e| e.kind() == "calculation"));
    }

    #[tokio::test]
    async fn test_slippage_clamped_non_negative() {
        // Output worth more than input: slippage clamps to zero
        let prices = FixedPrices::new()
            .with_default(USDC, dec!(1))
            .with_default(WSOL_MINT, dec!(100));

        let swaps = vec![swap(
            "s", 100, USDC, dec!(900), 6, WSOL_MINT, dec!(10), SOL_DECIMALS,
        )];

        let mut ledger = ledger();
        ledger.process(&swaps, &prices).await;
        let outcome = ledger.into_outcome();

        assert_eq!(outcome.enhanced_swaps[0].slippage_pct, 0.0);
    }

    #[tokio::test]
    async fn test_fee_converted_at_sol_price() {
        let prices = FixedPrices::new()
            .with_default(USDC, dec!(1))
            .with_default(WSOL_MINT, dec!(200));

        let swaps = vec![swap(
            "s", 100, USDC, dec!(2000), 6, WSOL_MINT, dec!(10), SOL_DECIMALS,
        )];

        let mut ledger = ledger();
        ledger.process(&swaps, &prices).await;
        let outcome = ledger.into_outcome();

        // 5000 lamports at $200/SOL
        assert_eq!(outcome.enhanced_swaps[0].fee_usd, dec!(0.001));
    }

    #[tokio::test]
    async fn test_mark_positions_sets_unrealized() {
        let prices = FixedPrices::new()
            .with_default(USDC, dec!(1))
            .with_default(TOK, dec!(15));

        let swaps = vec![swap("buy", 100, USDC, dec!(50), 6, TOK, dec!(5), TOK_DECIMALS)];

        let mut ledger = ledger();
        ledger.process(&swaps, &prices).await;
        ledger.mark_positions(&prices, ts(500)).await;
        let outcome = ledger.into_outcome();

        let pos = outcome
            .open_positions
            .iter()
            .find(|p| p.mint == TOK)
            .unwrap();
        // 5 units: cost $50, marked at $15 => $75
        assert_eq!(pos.unrealized_pnl_usd, dec!(25));
    }
}
