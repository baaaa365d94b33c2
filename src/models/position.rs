//! Open-position tracking with FIFO purchase lots.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Tolerance for "is this amount effectively zero" checks.
///
/// Lot consumption leaves sub-lamport residues behind; exact zero
/// comparisons would keep dead positions alive forever.
pub const EPSILON: Decimal = dec!(0.000000001);

/// Whether an amount is within dust tolerance of zero.
pub fn is_dust(amount: Decimal) -> bool {
    amount.abs() <= EPSILON
}

/// An open, partially-consumable unit of cost basis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseLot {
    /// Remaining token amount in this lot
    pub amount: Decimal,

    /// USD cost basis for the remaining amount
    pub cost_basis_usd: Decimal,

    /// When the lot was acquired
    pub acquired_at: DateTime<Utc>,

    /// Signature of the swap that created the lot
    pub signature: String,
}

impl PurchaseLot {
    /// USD cost per token for this lot.
    pub fn unit_cost(&self) -> Decimal {
        if is_dust(self.amount) {
            Decimal::ZERO
        } else {
            self.cost_basis_usd / self.amount
        }
    }
}

/// A slice of a lot consumed by a disposal, oldest lot first.
#[derive(Debug, Clone)]
pub struct ConsumedLot {
    pub amount: Decimal,
    pub cost_basis_usd: Decimal,
    pub acquired_at: DateTime<Utc>,
    pub entry_price_usd: Decimal,
    pub entry_signature: String,
}

/// All open lots for one (wallet, mint) pair.
///
/// Lots are kept in strict acquisition order; disposals consume from the
/// front. Cached totals are recomputed after every mutation and checked
/// against the lot sums by [`TokenPosition::reconcile`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPosition {
    pub mint: String,
    pub symbol: String,

    /// Total open amount across lots
    pub total_amount: Decimal,

    /// Total USD cost basis across lots
    pub total_cost_basis_usd: Decimal,

    pub first_acquired_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,

    /// Mark price applied by the most recent mark_to_market call
    pub last_price_usd: Option<Decimal>,

    /// Paper P&L against the mark price
    pub unrealized_pnl_usd: Decimal,

    lots: VecDeque<PurchaseLot>,
}

impl TokenPosition {
    pub fn new(mint: String, symbol: String, opened_at: DateTime<Utc>) -> Self {
        Self {
            mint,
            symbol,
            total_amount: Decimal::ZERO,
            total_cost_basis_usd: Decimal::ZERO,
            first_acquired_at: opened_at,
            last_activity_at: opened_at,
            last_price_usd: None,
            unrealized_pnl_usd: Decimal::ZERO,
            lots: VecDeque::new(),
        }
    }

    /// Volume-weighted average cost per token.
    pub fn average_cost_usd(&self) -> Decimal {
        if is_dust(self.total_amount) {
            Decimal::ZERO
        } else {
            self.total_cost_basis_usd / self.total_amount
        }
    }

    pub fn lot_count(&self) -> usize {
        self.lots.len()
    }

    /// Append a new lot at the back of the FIFO queue.
    pub fn push_lot(&mut self, lot: PurchaseLot) {
        self.last_activity_at = lot.acquired_at;
        self.total_amount += lot.amount;
        self.total_cost_basis_usd += lot.cost_basis_usd;
        self.lots.push_back(lot);
    }

    /// Consume up to `amount` from the front of the queue, oldest lot first.
    ///
    /// Returns one entry per lot (or partial lot) consumed. The uncovered
    /// remainder, if the request exceeds what is held, is left to the caller.
    pub fn consume(&mut self, amount: Decimal, at: DateTime<Utc>) -> Vec<ConsumedLot> {
        let mut remaining = amount;
        let mut consumed = Vec::new();

        while remaining > EPSILON {
            let Some(front) = self.lots.front_mut() else {
                break;
            };

            let unit_cost = front.unit_cost();
            if front.amount <= remaining + EPSILON {
                // Lot fully consumed
                let lot = match self.lots.pop_front() {
                    Some(lot) => lot,
                    None => break,
                };
                remaining -= lot.amount;
                self.total_amount -= lot.amount;
                self.total_cost_basis_usd -= lot.cost_basis_usd;
                consumed.push(ConsumedLot {
                    amount: lot.amount,
                    cost_basis_usd: lot.cost_basis_usd,
                    acquired_at: lot.acquired_at,
                    entry_price_usd: unit_cost,
                    entry_signature: lot.signature,
                });
            } else {
                // Partial consumption
                let cost = unit_cost * remaining;
                front.amount -= remaining;
                front.cost_basis_usd -= cost;
                let acquired_at = front.acquired_at;
                let signature = front.signature.clone();
                self.total_amount -= remaining;
                self.total_cost_basis_usd -= cost;
                consumed.push(ConsumedLot {
                    amount: remaining,
                    cost_basis_usd: cost,
                    acquired_at,
                    entry_price_usd: unit_cost,
                    entry_signature: signature,
                });
                remaining = Decimal::ZERO;
            }
        }

        self.last_activity_at = at;
        consumed
    }

    /// Whether the position is effectively empty and should be retired.
    pub fn is_empty(&self) -> bool {
        is_dust(self.total_amount) || self.lots.is_empty()
    }

    /// Recompute paper P&L against a current price.
    pub fn mark_to_market(&mut self, price_usd: Decimal) {
        self.last_price_usd = Some(price_usd);
        self.unrealized_pnl_usd = self.total_amount * price_usd - self.total_cost_basis_usd;
    }

    /// Check cached totals against the lot sums.
    ///
    /// Returns the (amount, cost) deltas when they disagree beyond tolerance.
    pub fn reconcile(&self) -> Result<(), (Decimal, Decimal)> {
        let lot_amount: Decimal = self.lots.iter().map(|l| l.amount).sum();
        let lot_cost: Decimal = self.lots.iter().map(|l| l.cost_basis_usd).sum();

        let amount_delta = (self.total_amount - lot_amount).abs();
        let cost_delta = (self.total_cost_basis_usd - lot_cost).abs();

        if amount_delta > EPSILON || cost_delta > EPSILON {
            Err((amount_delta, cost_delta))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn lot(amount: Decimal, cost: Decimal, secs: i64, sig: &str) -> PurchaseLot {
        PurchaseLot {
            amount,
            cost_basis_usd: cost,
            acquired_at: ts(secs),
            signature: sig.to_string(),
        }
    }

    #[test]
    fn test_push_lot_updates_totals() {
        let mut pos = TokenPosition::new("mint".to_string(), "TOK".to_string(), ts(0));
        pos.push_lot(lot(dec!(5), dec!(50), 100, "a"));
        pos.push_lot(lot(dec!(5), dec!(100), 200, "b"));

        assert_eq!(pos.total_amount, dec!(10));
        assert_eq!(pos.total_cost_basis_usd, dec!(150));
        assert_eq!(pos.average_cost_usd(), dec!(15));
        assert!(pos.reconcile().is_ok());
    }

    #[test]
    fn test_fifo_consumes_oldest_first() {
        let mut pos = TokenPosition::new("mint".to_string(), "TOK".to_string(), ts(0));
        pos.push_lot(lot(dec!(5), dec!(50), 100, "a")); // $10/unit
        pos.push_lot(lot(dec!(5), dec!(100), 200, "b")); // $20/unit

        let consumed = pos.consume(dec!(7), ts(300));

        assert_eq!(consumed.len(), 2);
        assert_eq!(consumed[0].amount, dec!(5));
        assert_eq!(consumed[0].entry_price_usd, dec!(10));
        assert_eq!(consumed[0].entry_signature, "a");
        assert_eq!(consumed[1].amount, dec!(2));
        assert_eq!(consumed[1].entry_price_usd, dec!(20));
        assert_eq!(consumed[1].entry_signature, "b");

        // Remaining: 3 units of the $20 lot
        assert_eq!(pos.total_amount, dec!(3));
        assert_eq!(pos.total_cost_basis_usd, dec!(60));
        assert_eq!(pos.lot_count(), 1);
        assert!(pos.reconcile().is_ok());
    }

    #[test]
    fn test_consume_more_than_held_leaves_remainder_to_caller() {
        let mut pos = TokenPosition::new("mint".to_string(), "TOK".to_string(), ts(0));
        pos.push_lot(lot(dec!(5), dec!(50), 100, "a"));

        let consumed = pos.consume(dec!(8), ts(200));

        let total: Decimal = consumed.iter().map(|c| c.amount).sum();
        assert_eq!(total, dec!(5));
        assert!(pos.is_empty());
    }

    #[test]
    fn test_full_consumption_retires_position() {
        let mut pos = TokenPosition::new("mint".to_string(), "TOK".to_string(), ts(0));
        pos.push_lot(lot(dec!(10), dec!(1000), 100, "a"));

        let consumed = pos.consume(dec!(10), ts(200));
        assert_eq!(consumed.len(), 1);
        assert!(pos.is_empty());
        assert!(is_dust(pos.total_amount));
        assert!(is_dust(pos.total_cost_basis_usd));
    }

    #[test]
    fn test_mark_to_market() {
        let mut pos = TokenPosition::new("mint".to_string(), "TOK".to_string(), ts(0));
        pos.push_lot(lot(dec!(10), dec!(1000), 100, "a"));

        pos.mark_to_market(dec!(110));
        assert_eq!(pos.unrealized_pnl_usd, dec!(100));

        pos.mark_to_market(dec!(90));
        assert_eq!(pos.unrealized_pnl_usd, dec!(-100));
    }

    #[test]
    fn test_reconcile_detects_drift() {
        let mut pos = TokenPosition::new("mint".to_string(), "TOK".to_string(), ts(0));
        pos.push_lot(lot(dec!(5), dec!(50), 100, "a"));
        pos.total_amount = dec!(6);

        assert!(pos.reconcile().is_err());
    }
}
