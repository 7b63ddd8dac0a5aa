//! Upstream price source
//!
//! Fetches prices for the tracked token set from the Jupiter price API

mod jupiter;
mod types;

pub use jupiter::{parse_quote, JupiterClient, JupiterConfig, JUPITER_PRICE_URL};
pub use types::{PriceSample, Quote, QuoteEntry, RetryPolicy, TrackedSymbol, UpstreamError};

use async_trait::async_trait;

/// Trait for upstream price source implementations
///
/// One call is one request; retrying is the caller's business.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch the current price of every symbol in `symbols`
    async fn fetch(&self, symbols: &[TrackedSymbol]) -> Result<Quote, UpstreamError>;
}
