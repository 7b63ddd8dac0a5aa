//! Upstream polling with per-cycle retry and backoff

use super::broadcast::BroadcastHub;
use super::buffer::SampleBuffer;
use super::cache::LatestValueCache;
use super::lifecycle::BackgroundService;
use super::scheduler::{Cadence, ScheduledTask, StopSignal};
use super::stats::StatsHandle;
use crate::feed::{PriceSample, PriceSource, Quote, RetryPolicy, TrackedSymbol};
use crate::telemetry::{
    increment, record_latency, set_gauge, CounterMetric, GaugeMetric, LatencyMetric,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How one poll cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// This many samples were buffered, cached and broadcast
    Published(usize),
    /// Upstream answered but no symbol had a usable price
    Empty,
    /// Permanent upstream error
    Aborted,
    /// Every attempt hit a transient error
    Exhausted { attempts: u32 },
    /// Stopped during a backoff wait
    Cancelled,
}

/// Periodically fetches prices and publishes them to the buffer, cache and subscribers
pub struct Poller {
    source: Arc<dyn PriceSource>,
    symbols: Vec<TrackedSymbol>,
    retry: RetryPolicy,
    interval: Duration,
    persist_symbols: Option<HashSet<String>>,
    buffer: Arc<SampleBuffer>,
    cache: Arc<LatestValueCache>,
    hub: Arc<BroadcastHub>,
    stats: StatsHandle,
}

impl Poller {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn PriceSource>,
        symbols: Vec<TrackedSymbol>,
        retry: RetryPolicy,
        interval: Duration,
        buffer: Arc<SampleBuffer>,
        cache: Arc<LatestValueCache>,
        hub: Arc<BroadcastHub>,
        stats: StatsHandle,
    ) -> Self {
        Self {
            source,
            symbols,
            retry,
            interval,
            persist_symbols: None,
            buffer,
            cache,
            hub,
            stats,
        }
    }

    /// Buffer only these symbols for persistence; an empty list buffers everything
    pub fn with_persist_symbols(mut self, symbols: &[String]) -> Self {
        self.persist_symbols = if symbols.is_empty() {
            None
        } else {
            Some(symbols.iter().cloned().collect())
        };
        self
    }

    pub fn symbols(&self) -> &[TrackedSymbol] {
        &self.symbols
    }

    /// Run one full cycle: fetch with retries, then publish
    pub async fn run_cycle(&self, mut stop: StopSignal) -> CycleOutcome {
        increment(CounterMetric::PollCycles, 1);
        self.stats.write().await.poll_cycles += 1;

        let (quote, observed_at) = match self.fetch_with_retry(&mut stop).await {
            Ok(fetched) => fetched,
            Err(outcome) => {
                if outcome != CycleOutcome::Cancelled {
                    increment(CounterMetric::CyclesFailed, 1);
                    self.stats.write().await.cycles_failed += 1;
                }
                return outcome;
            }
        };

        let samples = quote.samples(&self.symbols, observed_at);
        if samples.is_empty() {
            tracing::warn!(symbols = self.symbols.len(), "No usable prices in upstream response");
            return CycleOutcome::Empty;
        }

        self.publish(samples).await
    }

    async fn fetch_with_retry(
        &self,
        stop: &mut StopSignal,
    ) -> Result<(Quote, DateTime<Utc>), CycleOutcome> {
        let max_attempts = self.retry.max_attempts;

        for attempt in 1..=max_attempts {
            let started = Instant::now();
            let result = self.source.fetch(&self.symbols).await;
            record_latency(LatencyMetric::UpstreamFetch, started.elapsed());

            match result {
                Ok(quote) => return Ok((quote, Utc::now())),
                Err(e) if e.is_transient() => {
                    let wait = self.retry.backoff(attempt);
                    tracing::warn!(
                        error = %e,
                        attempt,
                        max_attempts,
                        wait_ms = wait.as_millis() as u64,
                        "Transient upstream error, backing off"
                    );
                    increment(CounterMetric::UpstreamRetries, 1);

                    tokio::select! {
                        biased;
                        _ = stop.stopped() => {
                            tracing::debug!(attempt, "Poll cycle cancelled during backoff");
                            return Err(CycleOutcome::Cancelled);
                        }
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, attempt, "Upstream request failed, skipping cycle");
                    return Err(CycleOutcome::Aborted);
                }
            }
        }

        tracing::error!(attempts = max_attempts, "Upstream fetch failed after all attempts, skipping cycle");
        Err(CycleOutcome::Exhausted {
            attempts: max_attempts,
        })
    }

    async fn publish(&self, samples: Vec<PriceSample>) -> CycleOutcome {
        let count = samples.len();

        let persisted: Vec<PriceSample> = match &self.persist_symbols {
            Some(allowed) => samples
                .iter()
                .filter(|s| allowed.contains(&s.symbol))
                .cloned()
                .collect(),
            None => samples.clone(),
        };
        let persisted_count = persisted.len();

        let buffered = self.buffer.append(persisted).await;
        set_gauge(GaugeMetric::BufferedSamples, buffered as f64);

        self.cache.update(&samples).await;
        let report = self.hub.broadcast(&samples).await;

        increment(CounterMetric::SamplesProduced, count as u64);
        {
            let mut stats = self.stats.write().await;
            stats.samples_produced += count as u64;
            stats.samples_buffered += persisted_count as u64;
            stats.broadcasts += 1;
        }

        tracing::debug!(
            samples = count,
            buffered,
            delivered = report.delivered,
            "Published price samples"
        );

        CycleOutcome::Published(count)
    }
}

#[async_trait]
impl BackgroundService for Poller {
    fn name(&self) -> &'static str {
        "poller"
    }

    fn start(self: Arc<Self>) -> ScheduledTask {
        let cadence = Cadence::FixedDelay {
            initial: Duration::ZERO,
            period: self.interval,
        };
        ScheduledTask::spawn("poller", cadence, move |stop| {
            let poller = self.clone();
            async move {
                poller.run_cycle(stop).await;
            }
        })
    }
}
