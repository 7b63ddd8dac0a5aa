//! Ingestion and fan-out pipeline
//!
//! The poller feeds the sample buffer, the latest-value cache and the
//! broadcast hub. The flusher drains the buffer into the store and the
//! snapshot recorder writes the cache out once per interval. All three run
//! only while at least one subscriber is connected.

mod broadcast;
mod buffer;
mod cache;
mod flusher;
mod lifecycle;
mod poller;
mod scheduler;
mod snapshot;
mod stats;

pub use broadcast::{
    BroadcastHub, BroadcastReport, ChannelSink, SendError, ServerMessage, SubscriberId,
    SubscriberRegistry, SubscriberSink,
};
pub use buffer::SampleBuffer;
pub use cache::LatestValueCache;
pub use flusher::{FlushOutcome, PersistenceFlusher};
pub use lifecycle::{BackgroundService, LifecycleController, LifecycleState};
pub use poller::{CycleOutcome, Poller};
pub use scheduler::{Cadence, ScheduledTask, StopSignal, StopTrigger};
pub use snapshot::{SnapshotOutcome, SnapshotRecorder};
pub use stats::{PipelineStats, StatsHandle};

use crate::data::PriceStore;
use crate::feed::{PriceSource, RetryPolicy, TrackedSymbol};
use std::sync::Arc;
use std::time::Duration;

/// Runtime settings for a [`Pipeline`]
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub symbols: Vec<TrackedSymbol>,
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
    /// Symbols buffered for persistence; empty means all
    pub persist_symbols: Vec<String>,
    pub flush_interval: Duration,
    pub snapshot_interval: Duration,
    /// Symbols that must all be cached for a snapshot to be written
    pub snapshot_symbols: Vec<String>,
}

/// Owns every piece of shared pipeline state
pub struct Pipeline {
    registry: Arc<SubscriberRegistry>,
    hub: Arc<BroadcastHub>,
    buffer: Arc<SampleBuffer>,
    cache: Arc<LatestValueCache>,
    poller: Arc<Poller>,
    flusher: Arc<PersistenceFlusher>,
    recorder: Arc<SnapshotRecorder>,
    lifecycle: LifecycleController,
    stats: StatsHandle,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn PriceSource>,
        store: Arc<dyn PriceStore>,
    ) -> Self {
        let registry = Arc::new(SubscriberRegistry::new());
        let hub = Arc::new(BroadcastHub::new(registry.clone()));
        let buffer = Arc::new(SampleBuffer::new());
        let cache = Arc::new(LatestValueCache::new());
        let stats = StatsHandle::default();

        let poller = Arc::new(
            Poller::new(
                source,
                config.symbols,
                config.retry,
                config.poll_interval,
                buffer.clone(),
                cache.clone(),
                hub.clone(),
                stats.clone(),
            )
            .with_persist_symbols(&config.persist_symbols),
        );
        let flusher = Arc::new(PersistenceFlusher::new(
            buffer.clone(),
            store.clone(),
            config.flush_interval,
            stats.clone(),
        ));
        let recorder = Arc::new(SnapshotRecorder::new(
            cache.clone(),
            store,
            config.snapshot_symbols,
            config.snapshot_interval,
            stats.clone(),
        ));

        // Poller first so its samples reach the final flush
        let services: Vec<Arc<dyn BackgroundService>> = vec![
            poller.clone() as Arc<dyn BackgroundService>,
            flusher.clone(),
            recorder.clone(),
        ];
        let lifecycle = LifecycleController::new(registry.clone(), services);

        Self {
            registry,
            hub,
            buffer,
            cache,
            poller,
            flusher,
            recorder,
            lifecycle,
            stats,
        }
    }

    /// Register a subscriber, starting background work if it is the first
    pub async fn connect(&self, sink: Arc<dyn SubscriberSink>) -> SubscriberId {
        self.lifecycle.admit(sink).await
    }

    /// Remove a subscriber, stopping background work if it was the last
    pub async fn disconnect(&self, id: SubscriberId) -> bool {
        self.lifecycle.release(id).await
    }

    /// Stop background work and run the final flushes
    pub async fn shutdown(&self) {
        self.lifecycle.shutdown().await;
    }

    pub async fn state(&self) -> LifecycleState {
        self.lifecycle.state().await
    }

    pub async fn stats(&self) -> PipelineStats {
        self.stats.read().await.clone()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.registry.len().await
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn buffer(&self) -> &Arc<SampleBuffer> {
        &self.buffer
    }

    pub fn cache(&self) -> &Arc<LatestValueCache> {
        &self.cache
    }

    pub fn poller(&self) -> &Arc<Poller> {
        &self.poller
    }

    pub fn flusher(&self) -> &Arc<PersistenceFlusher> {
        &self.flusher
    }

    pub fn recorder(&self) -> &Arc<SnapshotRecorder> {
        &self.recorder
    }
}
