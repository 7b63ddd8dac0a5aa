//! Periodic bulk write of buffered samples

use super::buffer::SampleBuffer;
use super::lifecycle::BackgroundService;
use super::scheduler::{Cadence, ScheduledTask};
use super::stats::StatsHandle;
use crate::data::PriceStore;
use crate::telemetry::{increment, set_gauge, CounterMetric, GaugeMetric};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Result of one flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was buffered
    Idle,
    Written { inserted: usize, rejected: usize },
    /// The store failed and the batch was discarded
    Dropped { count: usize },
}

pub struct PersistenceFlusher {
    buffer: Arc<SampleBuffer>,
    store: Arc<dyn PriceStore>,
    interval: Duration,
    stats: StatsHandle,
}

impl PersistenceFlusher {
    pub fn new(
        buffer: Arc<SampleBuffer>,
        store: Arc<dyn PriceStore>,
        interval: Duration,
        stats: StatsHandle,
    ) -> Self {
        Self {
            buffer,
            store,
            interval,
            stats,
        }
    }

    /// Drain the buffer and write it out in one call
    ///
    /// A failed write drops the batch; it is never put back.
    pub async fn flush_now(&self) -> FlushOutcome {
        let batch = self.buffer.take_and_clear().await;
        set_gauge(GaugeMetric::BufferedSamples, self.buffer.len().await as f64);

        if batch.is_empty() {
            return FlushOutcome::Idle;
        }

        let count = batch.len();
        match self.store.insert_samples(&batch).await {
            Ok(report) => {
                for rejected in &report.rejected {
                    tracing::warn!(
                        index = rejected.index,
                        symbol = batch.get(rejected.index).map(|s| s.symbol.as_str()),
                        reason = %rejected.reason,
                        "Store rejected price sample"
                    );
                }

                let rejected = report.rejected.len();
                increment(CounterMetric::SamplesWritten, report.inserted as u64);
                increment(CounterMetric::SamplesRejected, rejected as u64);
                {
                    let mut stats = self.stats.write().await;
                    stats.samples_written += report.inserted as u64;
                    stats.samples_rejected += rejected as u64;
                    stats.batches_written += 1;
                }

                tracing::info!(inserted = report.inserted, rejected, "Saved price batch");
                FlushOutcome::Written {
                    inserted: report.inserted,
                    rejected,
                }
            }
            Err(e) => {
                tracing::error!(error = %e, count, "Failed to save price batch, dropping it");
                increment(CounterMetric::SamplesDropped, count as u64);
                self.stats.write().await.samples_dropped += count as u64;
                FlushOutcome::Dropped { count }
            }
        }
    }
}

#[async_trait]
impl BackgroundService for PersistenceFlusher {
    fn name(&self) -> &'static str {
        "flusher"
    }

    fn start(self: Arc<Self>) -> ScheduledTask {
        ScheduledTask::spawn("flusher", Cadence::FixedRate(self.interval), move |_| {
            let flusher = self.clone();
            async move {
                flusher.flush_now().await;
            }
        })
    }

    async fn final_flush(&self) {
        self.flush_now().await;
    }
}
