//! Serde models for the JSON-RPC payloads consumed by the parser.
//!
//! Only the fields the pipeline actually reads are modeled; everything else
//! in the RPC response is ignored during deserialization.

use serde::{Deserialize, Serialize};

/// One entry from `getSignaturesForAddress`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: String,

    #[serde(default)]
    pub slot: u64,

    /// Unix timestamp; absent for very old or unconfirmed entries
    pub block_time: Option<i64>,

    /// Present when the transaction failed on-chain
    #[serde(default)]
    pub err: Option<serde_json::Value>,
}

/// Full transaction body from `getTransaction` (json encoding).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    #[serde(default)]
    pub slot: u64,

    pub block_time: Option<i64>,

    pub transaction: TransactionEnvelope,

    pub meta: Option<TransactionMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEnvelope {
    pub signatures: Vec<String>,
    pub message: TransactionMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMessage {
    pub account_keys: Vec<String>,
    pub instructions: Vec<CompiledInstruction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledInstruction {
    pub program_id_index: usize,

    /// Indices into `account_keys`
    #[serde(default)]
    pub accounts: Vec<usize>,

    /// Base58-encoded instruction data
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    /// Present when the transaction failed on-chain
    pub err: Option<serde_json::Value>,

    /// Network fee in lamports
    #[serde(default)]
    pub fee: u64,

    pub pre_token_balances: Option<Vec<UiTokenBalance>>,
    pub post_token_balances: Option<Vec<UiTokenBalance>>,

    #[serde(default)]
    pub log_messages: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiTokenBalance {
    pub account_index: usize,
    pub mint: String,

    /// Wallet that owns the token account
    pub owner: Option<String>,

    pub ui_token_amount: TokenAmount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAmount {
    /// Raw amount in base units, as a decimal string
    pub amount: String,

    pub decimals: u8,

    pub ui_amount: Option<f64>,
}

impl RpcTransaction {
    /// Primary signature of the transaction.
    pub fn signature(&self) -> Option<&str> {
        self.transaction.signatures.first().map(String::as_str)
    }

    /// Whether the transaction failed on-chain.
    pub fn failed(&self) -> bool {
        self.meta
            .as_ref()
            .map(|m| m.err.is_some())
            .unwrap_or(false)
    }
}
