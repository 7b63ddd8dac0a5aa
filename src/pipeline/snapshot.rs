//! Once-per-interval consolidated price record

use super::cache::LatestValueCache;
use super::lifecycle::BackgroundService;
use super::scheduler::{Cadence, ScheduledTask};
use super::stats::StatsHandle;
use crate::data::{MinuteSnapshot, PriceStore};
use crate::telemetry::{increment, CounterMetric};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Result of one snapshot attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Written,
    /// At least one required symbol had no cached price
    Skipped { missing: Vec<String> },
    /// The store failed
    Dropped,
}

pub struct SnapshotRecorder {
    cache: Arc<LatestValueCache>,
    store: Arc<dyn PriceStore>,
    required_symbols: Vec<String>,
    interval: Duration,
    stats: StatsHandle,
}

impl SnapshotRecorder {
    pub fn new(
        cache: Arc<LatestValueCache>,
        store: Arc<dyn PriceStore>,
        required_symbols: Vec<String>,
        interval: Duration,
        stats: StatsHandle,
    ) -> Self {
        Self {
            cache,
            store,
            required_symbols,
            interval,
            stats,
        }
    }

    pub fn required_symbols(&self) -> &[String] {
        &self.required_symbols
    }

    /// Write the latest cached value of every required symbol as one record
    pub async fn flush_now(&self) -> SnapshotOutcome {
        let values = match self.cache.select(&self.required_symbols).await {
            Ok(values) => values,
            Err(missing) => {
                tracing::warn!(?missing, "Missing cached prices, skipping snapshot");
                increment(CounterMetric::SnapshotsSkipped, 1);
                self.stats.write().await.snapshots_skipped += 1;
                return SnapshotOutcome::Skipped { missing };
            }
        };

        let snapshot = MinuteSnapshot {
            values,
            captured_at: Utc::now(),
        };

        match self.store.insert_snapshot(&snapshot).await {
            Ok(()) => {
                tracing::info!(values = ?snapshot.values, "Saved price snapshot");
                increment(CounterMetric::SnapshotsWritten, 1);
                self.stats.write().await.snapshots_written += 1;
                SnapshotOutcome::Written
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to save price snapshot");
                increment(CounterMetric::SnapshotsDropped, 1);
                self.stats.write().await.snapshots_dropped += 1;
                SnapshotOutcome::Dropped
            }
        }
    }
}

#[async_trait]
impl BackgroundService for SnapshotRecorder {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    fn start(self: Arc<Self>) -> ScheduledTask {
        ScheduledTask::spawn("snapshot", Cadence::FixedRate(self.interval), move |_| {
            let recorder = self.clone();
            async move {
                recorder.flush_now().await;
            }
        })
    }

    async fn final_flush(&self) {
        self.flush_now().await;
    }
}
