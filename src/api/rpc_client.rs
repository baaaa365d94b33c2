//! Solana JSON-RPC client used as the transaction source.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::errors::AnalysisError;

use super::rate_limit::RateLimiter;
use super::types::{RpcTransaction, SignatureInfo};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRY_ELAPSED: Duration = Duration::from_secs(20);

/// Signature page size accepted by `getSignaturesForAddress`.
const SIGNATURE_PAGE_LIMIT: usize = 1_000;

/// Capability to list and fetch a wallet's ledger transactions.
///
/// Partial results plus per-item errors are expected; implementations log
/// and skip individual failures rather than failing the whole fetch.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    async fn list_signatures(
        &self,
        wallet: &str,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, AnalysisError>;

    async fn fetch_transactions(
        &self,
        signatures: &[String],
    ) -> Result<Vec<RpcTransaction>, AnalysisError>;
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// JSON-RPC transaction source with retry and shared rate limiting.
pub struct RpcTransactionSource {
    client: Client,
    url: String,
    limiter: Arc<RateLimiter>,
}

impl RpcTransactionSource {
    pub fn new(url: String, limiter: Arc<RateLimiter>) -> Result<Self, AnalysisError> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| AnalysisError::fetch("rpc", e))?;

        Ok(Self {
            client,
            url,
            limiter,
        })
    }

    /// One JSON-RPC call with exponential backoff on transport errors.
    ///
    /// RPC-level errors are permanent (retrying the same request cannot
    /// help); transport and 5xx failures are transient.
    async fn rpc_call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>, AnalysisError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let policy = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(MAX_RETRY_ELAPSED))
            .build();

        let operation = || async {
            self.limiter.acquire().await;

            let response = self
                .client
                .post(&self.url)
                .json(&body)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(AnalysisError::fetch("rpc", e)))?;

            if response.status().is_server_error() {
                return Err(backoff::Error::transient(AnalysisError::fetch(
                    "rpc",
                    format!("server error: {}", response.status()),
                )));
            }
            if !response.status().is_success() {
                return Err(backoff::Error::permanent(AnalysisError::fetch(
                    "rpc",
                    format!("request failed: {}", response.status()),
                )));
            }

            let envelope: RpcEnvelope<T> = response
                .json()
                .await
                .map_err(|e| backoff::Error::permanent(AnalysisError::fetch("rpc", e)))?;

            if let Some(err) = envelope.error {
                return Err(backoff::Error::permanent(AnalysisError::fetch(
                    "rpc",
                    format!("rpc error {}: {}", err.code, err.message),
                )));
            }

            Ok(envelope.result)
        };

        backoff::future::retry(policy, operation).await
    }
}

#[async_trait]
impl TransactionSource for RpcTransactionSource {
    /// Fetch up to `limit` signatures, newest first, paging as needed.
    async fn list_signatures(
        &self,
        wallet: &str,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, AnalysisError> {
        let mut all: Vec<SignatureInfo> = Vec::new();
        let mut before: Option<String> = None;

        while all.len() < limit {
            let page_limit = (limit - all.len()).min(SIGNATURE_PAGE_LIMIT);
            let mut options = json!({ "limit": page_limit });
            if let Some(cursor) = &before {
                options["before"] = json!(cursor);
            }

            let page: Vec<SignatureInfo> = self
                .rpc_call("getSignaturesForAddress", json!([wallet, options]))
                .await?
                .unwrap_or_default();

            debug!(wallet = %wallet, page = page.len(), total = all.len(), "Fetched signature page");

            let exhausted = page.len() < page_limit;
            before = page.last().map(|s| s.signature.clone());
            all.extend(page);

            if exhausted {
                break;
            }
        }

        Ok(all)
    }

    /// Fetch transaction bodies one by one; failures degrade the batch
    /// instead of aborting it.
    async fn fetch_transactions(
        &self,
        signatures: &[String],
    ) -> Result<Vec<RpcTransaction>, AnalysisError> {
        let mut transactions = Vec::with_capacity(signatures.len());

        for signature in signatures {
            let params = json!([
                signature,
                { "encoding": "json", "maxSupportedTransactionVersion": 0 }
            ]);

            match self.rpc_call::<RpcTransaction>("getTransaction", params).await {
                Ok(Some(tx)) => transactions.push(tx),
                Ok(None) => {
                    debug!(signature = %signature, "Transaction not found, skipping");
                }
                Err(e) => {
                    warn!(signature = %signature, error = %e, "Failed to fetch transaction, skipping");
                }
            }
        }

        Ok(transactions)
    }
}
