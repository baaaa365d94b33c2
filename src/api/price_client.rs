//! Historical USD price source backed by an HTTP price API.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::AnalysisError;

use super::rate_limit::RateLimiter;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_RETRY_ELAPSED: Duration = Duration::from_secs(15);

/// Cache bucket width: one historical price per mint per hour is enough
/// resolution for swap valuation and keeps the per-run cache bounded.
const CACHE_BUCKET_SECS: i64 = 3_600;

/// Capability to price a token mint in USD at a point in time.
///
/// `Ok(None)` is the valid "no price known" outcome, distinct from a
/// transport failure.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn price_at(
        &self,
        mint: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<Decimal>, AnalysisError>;
}

#[derive(Debug, Deserialize)]
struct PriceEnvelope {
    data: Option<PricePoint>,
    #[serde(default = "default_true")]
    success: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct PricePoint {
    value: f64,
}

/// HTTP price client with an as-of historical endpoint, a current-price
/// fallback, and a per-run in-memory cache.
pub struct HistoricalPriceClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    limiter: Arc<RateLimiter>,
    cache: Mutex<HashMap<(String, i64), Option<Decimal>>>,
}

impl HistoricalPriceClient {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, AnalysisError> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| AnalysisError::fetch("price", e))?;

        Ok(Self {
            client,
            base_url,
            api_key,
            limiter,
            cache: Mutex::new(HashMap::new()),
        })
    }

    async fn get_price(&self, url: &str) -> Result<Option<Decimal>, AnalysisError> {
        let policy = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(MAX_RETRY_ELAPSED))
            .build();

        let operation = || async {
            self.limiter.acquire().await;

            let mut request = self.client.get(url);
            if let Some(key) = &self.api_key {
                request = request.header("X-API-KEY", key);
            }

            let response = request
                .send()
                .await
                .map_err(|e| backoff::Error::transient(AnalysisError::fetch("price", e)))?;

            // A missing price is a valid answer, not a failure
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if response.status().is_server_error() {
                return Err(backoff::Error::transient(AnalysisError::fetch(
                    "price",
                    format!("server error: {}", response.status()),
                )));
            }
            if !response.status().is_success() {
                return Err(backoff::Error::permanent(AnalysisError::fetch(
                    "price",
                    format!("request failed: {}", response.status()),
                )));
            }

            let envelope: PriceEnvelope = response
                .json()
                .await
                .map_err(|e| backoff::Error::permanent(AnalysisError::fetch("price", e)))?;

            if !envelope.success {
                return Ok(None);
            }

            Ok(envelope
                .data
                .and_then(|p| Decimal::from_f64_retain(p.value))
                .filter(|p| *p > Decimal::ZERO))
        };

        backoff::future::retry(policy, operation).await
    }
}

#[async_trait]
impl PriceSource for HistoricalPriceClient {
    async fn price_at(
        &self,
        mint: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<Decimal>, AnalysisError> {
        let bucket = timestamp.timestamp() / CACHE_BUCKET_SECS;
        let cache_key = (mint.to_string(), bucket);

        if let Some(cached) = self.cache.lock().await.get(&cache_key) {
            return Ok(*cached);
        }

        // As-of historical price first
        let historical_url = format!(
            "{}/defi/historical_price_unix?address={}&unixtime={}",
            self.base_url,
            mint,
            timestamp.timestamp()
        );
        let mut price = self.get_price(&historical_url).await?;

        // Current-price approximation when no historical point exists
        if price.is_none() {
            let current_url = format!("{}/defi/price?address={}", self.base_url, mint);
            price = self.get_price(&current_url).await?;
            if price.is_some() {
                warn!(mint = %mint, timestamp = %timestamp, "Using current price as historical fallback");
            }
        }

        debug!(mint = %mint, timestamp = %timestamp, price = ?price, "Price lookup");

        self.cache.lock().await.insert(cache_key, price);
        Ok(price)
    }
}
