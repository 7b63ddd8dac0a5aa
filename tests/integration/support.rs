//! Shared fakes for integration tests

use async_trait::async_trait;
use jlp_relay::feed::{PriceSource, Quote, QuoteEntry, RetryPolicy, TrackedSymbol, UpstreamError};
use jlp_relay::pipeline::PipelineConfig;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn tracked() -> Vec<TrackedSymbol> {
    vec![
        TrackedSymbol::new("JLP", "27G8MtK7VtTcCHkpASjSDdkWWYfoqT6ggEuKidVJidD4"),
        TrackedSymbol::new("SOL", "So11111111111111111111111111111111111111112"),
    ]
}

pub fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        symbols: tracked(),
        retry: RetryPolicy::default(),
        poll_interval: Duration::from_secs(1),
        persist_symbols: Vec::new(),
        flush_interval: Duration::from_secs(5),
        snapshot_interval: Duration::from_secs(60),
        snapshot_symbols: vec!["JLP".to_string(), "SOL".to_string()],
    }
}

/// What a [`FakeSource`] answers
#[derive(Clone)]
pub enum Answer {
    /// JLP priced at the call number in cents, SOL fixed
    Both,
    /// JLP only, priced at the call number in cents
    JlpOnly,
    Fail(UpstreamError),
}

/// Source with a fixed answer whose JLP price encodes the call number
pub struct FakeSource {
    answer: Answer,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(answer: Answer) -> Arc<Self> {
        Self::slow(answer, Duration::ZERO)
    }

    /// Every fetch takes `delay` before answering
    pub fn slow(answer: Answer, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            answer,
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for FakeSource {
    async fn fetch(&self, _symbols: &[TrackedSymbol]) -> Result<Quote, UpstreamError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) as i64 + 1;
        let jlp = QuoteEntry::Price(Decimal::new(call, 2));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match &self.answer {
            Answer::Both => Ok(Quote::new()
                .with("JLP", jlp)
                .with("SOL", QuoteEntry::Price(Decimal::new(14250, 2)))),
            Answer::JlpOnly => Ok(Quote::new().with("JLP", jlp)),
            Answer::Fail(e) => Err(e.clone()),
        }
    }
}
