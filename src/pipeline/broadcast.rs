//! Fan-out of fresh samples to connected subscribers

use crate::feed::PriceSample;
use crate::telemetry::{increment, CounterMetric};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Identity of one connected subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Why a message could not be handed to a subscriber
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("subscriber is not ready")]
    Full,
    #[error("subscriber channel is closed")]
    Closed,
}

/// Outbound side of one subscriber connection
pub trait SubscriberSink: Send + Sync {
    fn is_open(&self) -> bool;
    /// Hand over an encoded message without waiting
    fn send(&self, message: Arc<str>) -> Result<(), SendError>;
}

/// Sink backed by a bounded channel drained by the connection task
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Arc<str>>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl SubscriberSink for ChannelSink {
    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    fn send(&self, message: Arc<str>) -> Result<(), SendError> {
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }
}

/// Messages pushed to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage<'a> {
    PriceUpdate(Cow<'a, [PriceSample]>),
}

impl ServerMessage<'_> {
    pub fn encode(&self) -> Result<Arc<str>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::from)
    }
}

/// Per-broadcast delivery counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Connected subscribers
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: RwLock<HashMap<SubscriberId, Arc<dyn SubscriberSink>>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink, returning its id and the subscriber count afterwards
    pub async fn insert(&self, sink: Arc<dyn SubscriberSink>) -> (SubscriberId, usize) {
        let mut subscribers = self.subscribers.write().await;
        let id = SubscriberId::new();
        subscribers.insert(id, sink);
        (id, subscribers.len())
    }

    /// Remove a sink, returning the count afterwards, or `None` if it was not registered
    pub async fn remove(&self, id: SubscriberId) -> Option<usize> {
        let mut subscribers = self.subscribers.write().await;
        subscribers.remove(&id).map(|_| subscribers.len())
    }

    pub async fn len(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.subscribers.read().await.is_empty()
    }

    pub async fn snapshot(&self) -> Vec<(SubscriberId, Arc<dyn SubscriberSink>)> {
        self.subscribers
            .read()
            .await
            .iter()
            .map(|(id, sink)| (*id, sink.clone()))
            .collect()
    }
}

/// Sends each sample set to every open subscriber
pub struct BroadcastHub {
    registry: Arc<SubscriberRegistry>,
}

impl BroadcastHub {
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Encode once and deliver to all subscribers; per-subscriber failures are only counted
    pub async fn broadcast(&self, samples: &[PriceSample]) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        if samples.is_empty() {
            return report;
        }

        let message = match ServerMessage::PriceUpdate(Cow::Borrowed(samples)).encode() {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode price update");
                return report;
            }
        };

        for (id, sink) in self.registry.snapshot().await {
            if !sink.is_open() {
                report.skipped += 1;
                continue;
            }

            match sink.send(message.clone()) {
                Ok(()) => report.delivered += 1,
                Err(SendError::Full) => {
                    tracing::debug!(subscriber = %id, "Subscriber not ready, skipping update");
                    report.skipped += 1;
                }
                Err(e @ SendError::Closed) => {
                    tracing::warn!(subscriber = %id, error = %e, "Failed to send price update");
                    report.failed += 1;
                }
            }
        }

        increment(CounterMetric::Broadcasts, 1);
        tracing::debug!(
            samples = samples.len(),
            delivered = report.delivered,
            skipped = report.skipped,
            failed = report.failed,
            "Broadcast price update"
        );

        report
    }
}
