//! Cancellable background timers
//!
//! A [`ScheduledTask`] owns one spawned tokio task that runs a job on a
//! cadence until cancelled. Cancelling wakes the task out of any pending
//! wait immediately, but a job that is already running is allowed to finish.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

/// Receiving side of a stop request
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl StopSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_stopped(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once a stop is requested or the trigger is dropped
    pub async fn stopped(&mut self) {
        match self.rx.as_mut() {
            Some(rx) => {
                let _ = rx.wait_for(|stop| *stop).await;
            }
            None => std::future::pending().await,
        }
    }
}

/// Sending side of a stop request
#[derive(Debug)]
pub struct StopTrigger {
    tx: watch::Sender<bool>,
}

impl StopTrigger {
    pub fn new() -> (Self, StopSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, StopSignal { rx: Some(rx) })
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

/// When a scheduled job runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// First run after `initial`, then `period` after each run completes
    FixedDelay { initial: Duration, period: Duration },
    /// Every `period`, first run one period after start
    FixedRate(Duration),
}

/// Handle to a running timer
pub struct ScheduledTask {
    name: &'static str,
    trigger: StopTrigger,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Spawn `job` on `cadence`; the job gets a signal it can use to abandon long waits
    pub fn spawn<F, Fut>(name: &'static str, cadence: Cadence, mut job: F) -> Self
    where
        F: FnMut(StopSignal) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (trigger, signal) = StopTrigger::new();

        let handle = tokio::spawn(async move {
            tracing::debug!(task = name, ?cadence, "Scheduled task started");

            match cadence {
                Cadence::FixedDelay { initial, period } => {
                    let mut delay = initial;
                    loop {
                        let mut stop = signal.clone();
                        tokio::select! {
                            biased;
                            _ = stop.stopped() => break,
                            _ = sleep(delay) => {}
                        }
                        job(signal.clone()).await;
                        delay = period;
                    }
                }
                Cadence::FixedRate(period) => {
                    let mut ticker = interval_at(Instant::now() + period, period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    loop {
                        let mut stop = signal.clone();
                        tokio::select! {
                            biased;
                            _ = stop.stopped() => break,
                            _ = ticker.tick() => {}
                        }
                        job(signal.clone()).await;
                    }
                }
            }

            tracing::debug!(task = name, "Scheduled task stopped");
        });

        Self {
            name,
            trigger,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Cancel pending runs and wait for an in-flight run to complete
    pub async fn cancel(self) {
        let Self {
            name,
            trigger,
            handle,
        } = self;

        trigger.stop();
        if let Err(e) = handle.await {
            tracing::error!(task = name, error = %e, "Scheduled task ended abnormally");
        }
    }
}
