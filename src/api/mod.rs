//! Collaborator clients: transaction source, price source, rate limiting.

mod price_client;
mod rate_limit;
mod rpc_client;
mod types;

pub use price_client::{HistoricalPriceClient, PriceSource};
pub use rate_limit::RateLimiter;
pub use rpc_client::{RpcTransactionSource, TransactionSource};
pub use types::*;
