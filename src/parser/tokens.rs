//! Token allow-list and metadata.
//!
//! Swaps touching a mint outside this registry are discarded; the
//! analytics only cover tokens the bot is willing to trade.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Wrapped SOL; also the fee-paying asset for fee-to-USD conversion.
pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Metadata for one recognized mint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenMeta {
    pub symbol: String,
    pub decimals: u8,
}

/// Static mint → symbol/decimals mapping.
#[derive(Debug, Clone)]
pub struct TokenRegistry {
    tokens: HashMap<String, TokenMeta>,
}

impl Default for TokenRegistry {
    /// Registry seeded with the majors the copy-trading bot supports.
    fn default() -> Self {
        let mut registry = Self {
            tokens: HashMap::new(),
        };

        registry.insert(WSOL_MINT, "SOL", 9);
        registry.insert("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", "USDC", 6);
        registry.insert("Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB", "USDT", 6);
        registry.insert("4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R", "RAY", 6);
        registry.insert("mSoLzYCxHdYgdzU16g5QSh3i5K3z3KZK7ytfqcJm7So", "MSOL", 9);
        registry.insert("DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263", "BONK", 5);
        registry.insert("J1toso1uCk3RLmjorhTtrVwY9HJ7X8V9yYac6Y7kGCPn", "JITOSOL", 9);

        registry
    }
}

impl TokenRegistry {
    pub fn empty() -> Self {
        Self {
            tokens: HashMap::new(),
        }
    }

    pub fn insert(&mut self, mint: &str, symbol: &str, decimals: u8) {
        self.tokens.insert(
            mint.to_string(),
            TokenMeta {
                symbol: symbol.to_string(),
                decimals,
            },
        );
    }

    pub fn is_allowed(&self, mint: &str) -> bool {
        self.tokens.contains_key(mint)
    }

    /// Symbol for a mint; a shortened mint for unknown ones.
    pub fn symbol_for(&self, mint: &str) -> String {
        match self.tokens.get(mint) {
            Some(meta) => meta.symbol.clone(),
            None => mint.chars().take(8).collect(),
        }
    }

    pub fn get(&self, mint: &str) -> Option<&TokenMeta> {
        self.tokens.get(mint)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TokenMeta)> {
        self.tokens.iter()
    }
}
