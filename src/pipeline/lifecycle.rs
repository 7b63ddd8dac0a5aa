//! Starts and stops background work as subscribers come and go

use super::broadcast::{SubscriberId, SubscriberRegistry, SubscriberSink};
use super::scheduler::ScheduledTask;
use crate::telemetry::{set_gauge, GaugeMetric};
use async_trait::async_trait;
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A timer-driven component the controller can start and stop
#[async_trait]
pub trait BackgroundService: Send + Sync {
    fn name(&self) -> &'static str;

    /// Spawn the component's timer
    fn start(self: Arc<Self>) -> ScheduledTask;

    /// Write out whatever is pending; runs once after every timer has stopped
    async fn final_flush(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Running,
}

type RunningTasks = Option<Vec<ScheduledTask>>;

/// Runs the background services while at least one subscriber is connected
pub struct LifecycleController {
    registry: Arc<SubscriberRegistry>,
    services: Arc<[Arc<dyn BackgroundService>]>,
    /// `Some` while running; also serializes every transition
    tasks: Arc<Mutex<RunningTasks>>,
}

impl LifecycleController {
    pub fn new(registry: Arc<SubscriberRegistry>, services: Vec<Arc<dyn BackgroundService>>) -> Self {
        Self {
            registry,
            services: services.into(),
            tasks: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn state(&self) -> LifecycleState {
        match *self.tasks.lock().await {
            Some(_) => LifecycleState::Running,
            None => LifecycleState::Idle,
        }
    }

    /// Register a subscriber; the first one starts every service
    pub async fn admit(&self, sink: Arc<dyn SubscriberSink>) -> SubscriberId {
        let mut tasks = self.tasks.lock().await;
        let (id, count) = self.registry.insert(sink).await;
        set_gauge(GaugeMetric::Subscribers, count as f64);
        tracing::info!(subscriber = %id, subscribers = count, "Subscriber connected");

        if count == 1 && tasks.is_none() {
            tracing::info!(
                services = self.services.len(),
                "First subscriber connected, starting background services"
            );
            *tasks = Some(self.services.iter().map(|s| s.clone().start()).collect());
        }

        id
    }

    /// Remove a subscriber; the last one stops every service. Returns false for unknown ids.
    pub async fn release(&self, id: SubscriberId) -> bool {
        let tasks = self.tasks.clone().lock_owned().await;
        let Some(count) = self.registry.remove(id).await else {
            return false;
        };
        set_gauge(GaugeMetric::Subscribers, count as f64);
        tracing::info!(subscriber = %id, subscribers = count, "Subscriber disconnected");

        if count == 0 && tasks.is_some() {
            tracing::info!("Last subscriber disconnected, stopping background services");
            self.stop_all(tasks).await;
        }

        true
    }

    /// Stop every service regardless of connected subscribers
    pub async fn shutdown(&self) {
        let tasks = self.tasks.clone().lock_owned().await;
        if tasks.is_some() {
            tracing::info!("Shutting down background services");
            self.stop_all(tasks).await;
        }
    }

    /// Cancel the timers then flush every service.
    ///
    /// Runs on its own task holding the state lock, so the stop completes even
    /// if the caller is dropped and later transitions wait for it.
    async fn stop_all(&self, mut tasks: OwnedMutexGuard<RunningTasks>) {
        let services = self.services.clone();

        let stopping = tokio::spawn(async move {
            if let Some(running) = tasks.take() {
                join_all(running.into_iter().map(ScheduledTask::cancel)).await;
            }

            for service in services.iter() {
                tracing::debug!(service = service.name(), "Final flush");
                service.final_flush().await;
            }

            tracing::info!("Background services stopped");
        });

        if let Err(e) = stopping.await {
            tracing::error!(error = %e, "Stopping background services failed");
        }
    }
}
