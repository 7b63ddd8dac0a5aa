//! Jupiter price API client
//!
//! Queries `lite-api.jup.ag/price/v2` for every tracked mint in one request.
//! The response maps each mint to an object carrying a decimal-string price:
//!
//! ```json
//! {"data": {"So111...": {"id": "So111...", "type": "derivedPrice", "price": "187.42"}}}
//! ```
//!
//! Mints the API does not know come back as `null` or are omitted.

use super::{PriceSource, Quote, QuoteEntry, TrackedSymbol, UpstreamError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Jupiter price API endpoint
pub const JUPITER_PRICE_URL: &str = "https://lite-api.jup.ag/price/v2";

/// Configuration for the Jupiter client
#[derive(Debug, Clone)]
pub struct JupiterConfig {
    /// Price endpoint, without query string
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for JupiterConfig {
    fn default() -> Self {
        Self {
            base_url: JUPITER_PRICE_URL.to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Client for the Jupiter price API
pub struct JupiterClient {
    config: JupiterConfig,
    client: Client,
}

impl JupiterClient {
    /// Create a client with default configuration
    pub fn new() -> anyhow::Result<Self> {
        Self::with_config(JupiterConfig::default())
    }

    /// Create a client with custom configuration
    pub fn with_config(config: JupiterConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    /// Build the query URL; mints are base58 so the comma-joined list needs no escaping
    fn build_url(&self, symbols: &[TrackedSymbol]) -> String {
        let ids = symbols
            .iter()
            .map(|s| s.source_key.as_str())
            .collect::<Vec<_>>()
            .join(",");
        format!("{}?ids={}", self.config.base_url, ids)
    }
}

#[async_trait]
impl PriceSource for JupiterClient {
    async fn fetch(&self, symbols: &[TrackedSymbol]) -> Result<Quote, UpstreamError> {
        let url = self.build_url(symbols);

        tracing::trace!(url = %url, "Querying Jupiter price API");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(UpstreamError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(classify_transport_error)?;
        parse_quote(&body, symbols)
    }
}

fn classify_transport_error(e: reqwest::Error) -> UpstreamError {
    if e.is_decode() {
        UpstreamError::Malformed(e.to_string())
    } else {
        UpstreamError::Unavailable(e.to_string())
    }
}

/// Raw response envelope
#[derive(Debug, Deserialize)]
struct PriceResponse {
    data: HashMap<String, Value>,
}

/// Validate a raw response body into a typed quote
///
/// Only a body without a `data` object is a failure; problems with individual
/// mints become `Absent` or `Invalid` entries.
pub fn parse_quote(body: &str, symbols: &[TrackedSymbol]) -> Result<Quote, UpstreamError> {
    let response: PriceResponse =
        serde_json::from_str(body).map_err(|e| UpstreamError::Malformed(e.to_string()))?;

    let mut quote = Quote::new();
    for tracked in symbols {
        let entry = match response.data.get(&tracked.source_key) {
            None | Some(Value::Null) => QuoteEntry::Absent,
            Some(Value::Object(fields)) => match parse_price(fields.get("price")) {
                Ok(price) => QuoteEntry::Price(price),
                Err(reason) => QuoteEntry::Invalid(reason),
            },
            Some(other) => QuoteEntry::Invalid(format!("unexpected entry: {}", other)),
        };
        quote.insert(tracked.symbol.clone(), entry);
    }

    Ok(quote)
}

/// Parse a price given either as a decimal string or a JSON number
fn parse_price(value: Option<&Value>) -> Result<Decimal, String> {
    let text = match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Null) | None => return Err("missing price".to_string()),
        Some(other) => return Err(format!("non-numeric price: {}", other)),
    };

    let price = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| format!("non-numeric price: {}", text))?;

    if price < Decimal::ZERO {
        return Err(format!("negative price: {}", price));
    }

    Ok(price)
}
