//! Price feed types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// A symbol tracked for the lifetime of the process
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackedSymbol {
    /// Display symbol (e.g., "JLP")
    pub symbol: String,
    /// Key the upstream API knows the token by (mint address)
    pub source_key: String,
}

impl TrackedSymbol {
    pub fn new(symbol: impl Into<String>, source_key: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            source_key: source_key.into(),
        }
    }
}

/// A single validated price observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    /// Display symbol
    pub symbol: String,
    /// Observed price, never negative
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// Upstream key the price was fetched under
    #[serde(rename = "tokenId")]
    pub source_key: String,
    /// Timestamp shared by every sample of one poll cycle
    #[serde(rename = "timestamp")]
    pub observed_at: DateTime<Utc>,
}

/// Per-symbol result of one upstream query
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteEntry {
    /// Usable price
    Price(Decimal),
    /// Upstream did not return this symbol
    Absent,
    /// Upstream returned the symbol with an unusable price
    Invalid(String),
}

static ABSENT: QuoteEntry = QuoteEntry::Absent;

/// Typed result of one upstream query, keyed by display symbol
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Quote {
    entries: HashMap<String, QuoteEntry>,
}

impl Quote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, symbol: impl Into<String>, entry: QuoteEntry) -> Self {
        self.insert(symbol, entry);
        self
    }

    pub fn insert(&mut self, symbol: impl Into<String>, entry: QuoteEntry) {
        self.entries.insert(symbol.into(), entry);
    }

    /// Entry for `symbol`; symbols never inserted are `Absent`
    pub fn get(&self, symbol: &str) -> &QuoteEntry {
        self.entries.get(symbol).unwrap_or(&ABSENT)
    }

    /// One sample per tracked symbol with a usable price, all stamped `observed_at`
    ///
    /// Absent and invalid entries are logged and skipped.
    pub fn samples(&self, symbols: &[TrackedSymbol], observed_at: DateTime<Utc>) -> Vec<PriceSample> {
        let mut samples = Vec::with_capacity(symbols.len());

        for tracked in symbols {
            match self.get(&tracked.symbol) {
                QuoteEntry::Price(price) => samples.push(PriceSample {
                    symbol: tracked.symbol.clone(),
                    price: *price,
                    source_key: tracked.source_key.clone(),
                    observed_at,
                }),
                QuoteEntry::Absent => {
                    tracing::warn!(
                        symbol = %tracked.symbol,
                        source_key = %tracked.source_key,
                        "Price not found in upstream response"
                    );
                }
                QuoteEntry::Invalid(reason) => {
                    tracing::warn!(
                        symbol = %tracked.symbol,
                        reason = %reason,
                        "Invalid price in upstream response"
                    );
                }
            }
        }

        samples
    }

    /// Number of symbols that carry a usable price
    pub fn price_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| matches!(e, QuoteEntry::Price(_)))
            .count()
    }
}

/// Upstream failures, split by whether a retry can help
#[derive(Debug, Clone, Error, PartialEq)]
pub enum UpstreamError {
    /// Network error, timeout or connection reset
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),
    /// HTTP 429
    #[error("Upstream rate limited")]
    RateLimited,
    /// Any other non-success status
    #[error("Upstream rejected request: {status} - {body}")]
    Rejected { status: u16, body: String },
    /// Body did not have the expected shape
    #[error("Upstream response malformed: {0}")]
    Malformed(String),
}

impl UpstreamError {
    /// Whether the poller should back off and try again
    pub fn is_transient(&self) -> bool {
        matches!(self, UpstreamError::Unavailable(_) | UpstreamError::RateLimited)
    }
}

/// Retry ceiling and backoff unit for one poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per cycle before giving up
    pub max_attempts: u32,
    /// Base time unit; attempt `n` waits `2^n` units
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(2u32.saturating_pow(attempt))
    }
}
