//! Reconstructs economic swap events from raw ledger transactions.
//!
//! A transaction qualifies as a simple two-leg swap when it executed an
//! instruction from a recognized AMM program and the wallet's net token
//! balance deltas are exactly two non-dust changes of opposite sign.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use crate::api::{CompiledInstruction, RpcTransaction, TransactionMeta};
use crate::errors::AnalysisError;
use crate::models::{is_dust, Swap, SwapKind, TokenLeg};

use super::programs::{venue_for_program, SWAP_BASE_IN_TAG, SWAP_BASE_OUT_TAG};
use super::tokens::TokenRegistry;

/// Net balance change for one mint owned by the analyzed wallet.
#[derive(Debug)]
struct MintDelta {
    mint: String,
    delta: i128,
    decimals: u8,
}

/// Pure parser from raw transactions to normalized [`Swap`] records.
pub struct SwapParser {
    registry: Arc<TokenRegistry>,
}

impl SwapParser {
    pub fn new(registry: Arc<TokenRegistry>) -> Self {
        Self { registry }
    }

    /// Parse one transaction into zero-or-one swap.
    ///
    /// `Ok(None)` covers every expected rejection: failed on-chain, no
    /// recognized AMM instruction, wallet untouched, not a simple two-leg
    /// swap, or a mint outside the allow-list. `Err` means the payload
    /// itself was malformed.
    pub fn parse(
        &self,
        tx: &RpcTransaction,
        wallet: &str,
    ) -> Result<Option<Swap>, AnalysisError> {
        let signature = tx
            .signature()
            .ok_or_else(|| AnalysisError::Parsing {
                signature: "<unknown>".to_string(),
                reason: "transaction has no signature".to_string(),
            })?
            .to_string();

        let meta = tx.meta.as_ref().ok_or_else(|| AnalysisError::Parsing {
            signature: signature.clone(),
            reason: "transaction has no meta".to_string(),
        })?;

        if meta.err.is_some() {
            return Ok(None);
        }

        let account_keys = &tx.transaction.message.account_keys;
        let Some((instruction, venue)) = self.find_amm_instruction(tx) else {
            return Ok(None);
        };

        let block_time = tx
            .block_time
            .and_then(|t| Utc.timestamp_opt(t, 0).single())
            .ok_or_else(|| AnalysisError::Parsing {
                signature: signature.clone(),
                reason: "transaction has no block time".to_string(),
            })?;

        let deltas = self.wallet_mint_deltas(meta, wallet, &signature)?;
        let non_dust: Vec<&MintDelta> = deltas
            .iter()
            .filter(|d| !is_dust(ui_amount(d.delta, d.decimals)))
            .collect();

        // Anything other than one leg out + one leg in is not a simple swap
        if non_dust.len() != 2 {
            return Ok(None);
        }
        let (outgoing, incoming) = match (non_dust[0].delta < 0, non_dust[1].delta < 0) {
            (true, false) => (non_dust[0], non_dust[1]),
            (false, true) => (non_dust[1], non_dust[0]),
            _ => return Ok(None),
        };

        if !self.registry.is_allowed(&outgoing.mint) || !self.registry.is_allowed(&incoming.mint) {
            debug!(
                signature = %signature,
                token_in = %outgoing.mint,
                token_out = %incoming.mint,
                "Swap discarded: mint outside allow-list"
            );
            return Ok(None);
        }

        let token_in = TokenLeg {
            mint: outgoing.mint.clone(),
            raw_amount: leg_amount(outgoing.delta, &signature)?,
            decimals: outgoing.decimals,
        };
        let token_out = TokenLeg {
            mint: incoming.mint.clone(),
            raw_amount: leg_amount(incoming.delta, &signature)?,
            decimals: incoming.decimals,
        };

        let pool = instruction
            .accounts
            .first()
            .and_then(|i| account_keys.get(*i))
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Some(Swap {
            signature,
            wallet: wallet.to_string(),
            block_time,
            token_in,
            token_out,
            fee_lamports: meta.fee,
            pool,
            venue: venue.to_string(),
            kind: instruction_kind(&instruction.data),
        }))
    }

    /// Parse a transaction batch, capturing per-item failures instead of
    /// aborting the rest.
    pub fn parse_batch(
        &self,
        transactions: &[RpcTransaction],
        wallet: &str,
    ) -> (Vec<Swap>, Vec<AnalysisError>) {
        let mut swaps = Vec::new();
        let mut errors = Vec::new();

        for tx in transactions {
            match self.parse(tx, wallet) {
                Ok(Some(swap)) => swaps.push(swap),
                Ok(None) => {}
                Err(e) => errors.push(e),
            }
        }

        debug!(
            wallet = %wallet,
            transactions = transactions.len(),
            swaps = swaps.len(),
            errors = errors.len(),
            "Parsed transaction batch"
        );

        (swaps, errors)
    }

    /// First instruction executed by a recognized AMM program.
    fn find_amm_instruction<'a>(
        &self,
        tx: &'a RpcTransaction,
    ) -> Option<(&'a CompiledInstruction, &'static str)> {
        let message = &tx.transaction.message;
        message.instructions.iter().find_map(|instruction| {
            message
                .account_keys
                .get(instruction.program_id_index)
                .and_then(|program_id| venue_for_program(program_id))
                .map(|venue| (instruction, venue))
        })
    }

    /// Net per-mint balance deltas for token accounts owned by the wallet.
    fn wallet_mint_deltas(
        &self,
        meta: &TransactionMeta,
        wallet: &str,
        signature: &str,
    ) -> Result<Vec<MintDelta>, AnalysisError> {
        let mut by_mint: HashMap<String, (i128, u8)> = HashMap::new();

        let parse_amount = |raw: &str| -> Result<i128, AnalysisError> {
            raw.parse::<i128>().map_err(|_| AnalysisError::Parsing {
                signature: signature.to_string(),
                reason: format!("unparseable token amount '{}'", raw),
            })
        };

        for balance in meta.pre_token_balances.iter().flatten() {
            if balance.owner.as_deref() != Some(wallet) {
                continue;
            }
            let amount = parse_amount(&balance.ui_token_amount.amount)?;
            let entry = by_mint
                .entry(balance.mint.clone())
                .or_insert((0, balance.ui_token_amount.decimals));
            entry.0 -= amount;
        }

        for balance in meta.post_token_balances.iter().flatten() {
            if balance.owner.as_deref() != Some(wallet) {
                continue;
            }
            let amount = parse_amount(&balance.ui_token_amount.amount)?;
            let entry = by_mint
                .entry(balance.mint.clone())
                .or_insert((0, balance.ui_token_amount.decimals));
            entry.0 += amount;
        }

        Ok(by_mint
            .into_iter()
            .map(|(mint, (delta, decimals))| MintDelta {
                mint,
                delta,
                decimals,
            })
            .collect())
    }
}

fn ui_amount(delta: i128, decimals: u8) -> Decimal {
    Decimal::from(delta) / Decimal::from(10u64.pow(decimals as u32))
}

fn leg_amount(delta: i128, signature: &str) -> Result<u64, AnalysisError> {
    u64::try_from(delta.unsigned_abs()).map_err(|_| AnalysisError::Parsing {
        signature: signature.to_string(),
        reason: "token amount exceeds u64 range".to_string(),
    })
}

/// Instruction subtype from the first byte of the base58 data.
fn instruction_kind(data: &str) -> SwapKind {
    let Ok(decoded) = bs58::decode(data).into_vec() else {
        return SwapKind::Unknown;
    };
    match decoded.first() {
        Some(&SWAP_BASE_IN_TAG) => SwapKind::SwapBaseIn,
        Some(&SWAP_BASE_OUT_TAG) => SwapKind::SwapBaseOut,
        _ => SwapKind::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{
        TokenAmount, TransactionEnvelope, TransactionMessage, TransactionMeta, UiTokenBalance,
    };
    use crate::parser::programs::RAYDIUM_AMM_V4_PROGRAM_ID;
    use crate::parser::tokens::WSOL_MINT;
    use rust_decimal_macros::dec;

    const WALLET: &str = "WaLLet1111111111111111111111111111111111111";
    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    fn balance(index: usize, mint: &str, owner: &str, amount: &str, decimals: u8) -> UiTokenBalance {
        UiTokenBalance {
            account_index: index,
            mint: mint.to_string(),
            owner: Some(owner.to_string()),
            ui_token_amount: TokenAmount {
                amount: amount.to_string(),
                decimals,
                ui_amount: None,
            },
        }
    }

    fn swap_tx(
        program_id: &str,
        pre: Vec<UiTokenBalance>,
        post: Vec<UiTokenBalance>,
    ) -> RpcTransaction {
        RpcTransaction {
            slot: 1,
            block_time: Some(1_714_000_000),
            transaction: TransactionEnvelope {
                signatures: vec!["sig1".to_string()],
                message: TransactionMessage {
                    account_keys: vec![
                        WALLET.to_string(),
                        "Poo11111111111111111111111111111111111111111".to_string(),
                        program_id.to_string(),
                    ],
                    instructions: vec![CompiledInstruction {
                        program_id_index: 2,
                        accounts: vec![1, 0],
                        // First byte 9 = swapBaseIn
                        data: bs58::encode(vec![9u8, 0, 0, 0]).into_string(),
                    }],
                },
            },
            meta: Some(TransactionMeta {
                err: None,
                fee: 5_000,
                pre_token_balances: Some(pre),
                post_token_balances: Some(post),
                log_messages: None,
            }),
        }
    }

    fn sol_to_usdc_tx() -> RpcTransaction {
        swap_tx(
            RAYDIUM_AMM_V4_PROGRAM_ID,
            vec![
                balance(3, WSOL_MINT, WALLET, "2000000000", 9),
                balance(4, USDC, WALLET, "0", 6),
            ],
            vec![
                balance(3, WSOL_MINT, WALLET, "1000000000", 9),
                balance(4, USDC, WALLET, "150000000", 6),
            ],
        )
    }

    fn parser() -> SwapParser {
        SwapParser::new(Arc::new(TokenRegistry::default()))
    }

    #[test]
    fn test_parses_two_leg_swap() {
        let swap = parser().parse(&sol_to_usdc_tx(), WALLET).unwrap().unwrap();

        assert_eq!(swap.signature, "sig1");
        assert_eq!(swap.token_in.mint, WSOL_MINT);
        assert_eq!(swap.token_in.amount(), dec!(1));
        assert_eq!(swap.token_out.mint, USDC);
        assert_eq!(swap.token_out.amount(), dec!(150));
        assert_eq!(swap.fee_lamports, 5_000);
        assert_eq!(swap.venue, "raydium");
        assert_eq!(swap.kind, SwapKind::SwapBaseIn);
        assert_eq!(swap.pool, "Poo11111111111111111111111111111111111111111");
    }

    #[test]
    fn test_rejects_failed_transaction() {
        let mut tx = sol_to_usdc_tx();
        tx.meta.as_mut().unwrap().err = Some(serde_json::json!({"InstructionError": [0, {}]}));

        assert!(parser().parse(&tx, WALLET).unwrap().is_none());
    }

    #[test]
    fn test_rejects_unrecognized_program() {
        let tx = swap_tx(
            "Unknown111111111111111111111111111111111111",
            vec![balance(3, WSOL_MINT, WALLET, "2000000000", 9)],
            vec![balance(3, WSOL_MINT, WALLET, "1000000000", 9)],
        );

        assert!(parser().parse(&tx, WALLET).unwrap().is_none());
    }

    #[test]
    fn test_rejects_single_leg_change() {
        // Only one balance moved: a transfer, not a swap
        let tx = swap_tx(
            RAYDIUM_AMM_V4_PROGRAM_ID,
            vec![balance(3, WSOL_MINT, WALLET, "2000000000", 9)],
            vec![balance(3, WSOL_MINT, WALLET, "1000000000", 9)],
        );

        assert!(parser().parse(&tx, WALLET).unwrap().is_none());
    }

    #[test]
    fn test_rejects_other_wallets_balances() {
        let other = "OtherWallet111111111111111111111111111111111";
        let tx = swap_tx(
            RAYDIUM_AMM_V4_PROGRAM_ID,
            vec![
                balance(3, WSOL_MINT, other, "2000000000", 9),
                balance(4, USDC, other, "0", 6),
            ],
            vec![
                balance(3, WSOL_MINT, other, "1000000000", 9),
                balance(4, USDC, other, "150000000", 6),
            ],
        );

        assert!(parser().parse(&tx, WALLET).unwrap().is_none());
    }

    #[test]
    fn test_discards_mint_outside_allow_list() {
        let meme = "MemeCoin11111111111111111111111111111111111";
        let tx = swap_tx(
            RAYDIUM_AMM_V4_PROGRAM_ID,
            vec![
                balance(3, WSOL_MINT, WALLET, "2000000000", 9),
                balance(4, meme, WALLET, "0", 6),
            ],
            vec![
                balance(3, WSOL_MINT, WALLET, "1000000000", 9),
                balance(4, meme, WALLET, "150000000", 6),
            ],
        );

        assert!(parser().parse(&tx, WALLET).unwrap().is_none());
    }

    #[test]
    fn test_aggregates_multiple_token_accounts_per_mint() {
        // Two USDC accounts owned by the wallet net out to one delta
        let tx = swap_tx(
            RAYDIUM_AMM_V4_PROGRAM_ID,
            vec![
                balance(3, WSOL_MINT, WALLET, "2000000000", 9),
                balance(4, USDC, WALLET, "100000000", 6),
                balance(5, USDC, WALLET, "0", 6),
            ],
            vec![
                balance(3, WSOL_MINT, WALLET, "1000000000", 9),
                balance(4, USDC, WALLET, "100000000", 6),
                balance(5, USDC, WALLET, "150000000", 6),
            ],
        );

        let swap = parser().parse(&tx, WALLET).unwrap().unwrap();
        assert_eq!(swap.token_out.amount(), dec!(150));
    }

    #[test]
    fn test_batch_captures_errors_and_continues() {
        let good = sol_to_usdc_tx();
        let mut bad = sol_to_usdc_tx();
        bad.block_time = None;

        let (swaps, errors) = parser().parse_batch(&[bad, good], WALLET);

        assert_eq!(swaps.len(), 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), "parsing");
    }
}
