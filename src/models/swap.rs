//! Swap models: one normalized AMM exchange event per transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// One leg of a swap: a token mint with a raw on-chain amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenLeg {
    /// Token mint address
    pub mint: String,

    /// Amount in base units (not decimal adjusted)
    pub raw_amount: u64,

    /// Decimal places for this mint
    pub decimals: u8,
}

impl TokenLeg {
    /// Decimal-adjusted amount.
    pub fn amount(&self) -> Decimal {
        Decimal::from(self.raw_amount) / Decimal::from(10u64.pow(self.decimals as u32))
    }
}

/// Which AMM instruction produced the swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapKind {
    SwapBaseIn,
    SwapBaseOut,
    Unknown,
}

impl SwapKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapKind::SwapBaseIn => "swap_base_in",
            SwapKind::SwapBaseOut => "swap_base_out",
            SwapKind::Unknown => "unknown",
        }
    }
}

/// One AMM exchange event attributable to the analyzed wallet.
///
/// Immutable once built by the parser. The transaction signature is the
/// natural key; token-in is the leg the wallet gave up, token-out the leg
/// it received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Swap {
    /// Transaction signature (unique per swap)
    pub signature: String,

    /// Wallet the swap is attributed to
    pub wallet: String,

    /// Block timestamp
    pub block_time: DateTime<Utc>,

    /// Leg leaving the wallet
    pub token_in: TokenLeg,

    /// Leg entering the wallet
    pub token_out: TokenLeg,

    /// Network fee in lamports
    pub fee_lamports: u64,

    /// AMM pool account involved
    pub pool: String,

    /// Venue label for the matched AMM program (e.g. "raydium")
    pub venue: String,

    /// Instruction subtype
    pub kind: SwapKind,
}

impl Swap {
    /// Network fee in SOL.
    pub fn fee_sol(&self) -> Decimal {
        Decimal::from(self.fee_lamports) / Decimal::from(LAMPORTS_PER_SOL)
    }
}

/// A swap annotated with USD prices, values, and realized P&L.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedSwap {
    pub swap: Swap,

    /// USD price of the disposal leg at the swap timestamp
    pub token_in_price_usd: Decimal,

    /// USD price of the acquisition leg at the swap timestamp
    pub token_out_price_usd: Decimal,

    /// USD value given up
    pub token_in_value_usd: Decimal,

    /// USD value received
    pub token_out_value_usd: Decimal,

    /// Realized P&L attributed to this swap's disposal leg
    pub realized_pnl_usd: Decimal,

    /// Relative value lost between the two legs, clamped to >= 0
    pub slippage_pct: f64,

    /// Network fee converted to USD at the swap timestamp
    pub fee_usd: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_token_leg_amount() {
        let leg = TokenLeg {
            mint: "So11111111111111111111111111111111111111112".to_string(),
            raw_amount: 1_500_000_000,
            decimals: 9,
        };
        assert_eq!(leg.amount(), dec!(1.5));

        let usdc = TokenLeg {
            mint: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string(),
            raw_amount: 2_500_000,
            decimals: 6,
        };
        assert_eq!(usdc.amount(), dec!(2.5));
    }

    #[test]
    fn test_fee_sol() {
        let swap = Swap {
            signature: "sig".to_string(),
            wallet: "wallet".to_string(),
            block_time: Utc::now(),
            token_in: TokenLeg {
                mint: "a".to_string(),
                raw_amount: 1,
                decimals: 0,
            },
            token_out: TokenLeg {
                mint: "b".to_string(),
                raw_amount: 1,
                decimals: 0,
            },
            fee_lamports: 5_000,
            pool: "pool".to_string(),
            venue: "raydium".to_string(),
            kind: SwapKind::SwapBaseIn,
        };
        assert_eq!(swap.fee_sol(), dec!(0.000005));
    }
}
