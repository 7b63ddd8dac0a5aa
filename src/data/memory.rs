//! In-memory price store

use super::{InsertReport, MinuteSnapshot, PriceStore, StoreError};
use crate::feed::PriceSample;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Store that keeps everything in memory; can be switched offline to simulate outages
pub struct MemoryStore {
    samples: Arc<RwLock<Vec<PriceSample>>>,
    snapshots: Arc<RwLock<Vec<MinuteSnapshot>>>,
    available: AtomicBool,
    sample_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            samples: Arc::new(RwLock::new(vec![])),
            snapshots: Arc::new(RwLock::new(vec![])),
            available: AtomicBool::new(true),
            sample_writes: AtomicUsize::new(0),
        }
    }

    /// Toggle whether writes succeed
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn samples(&self) -> Vec<PriceSample> {
        self.samples.read().await.clone()
    }

    pub async fn snapshots(&self) -> Vec<MinuteSnapshot> {
        self.snapshots.read().await.clone()
    }

    /// Number of bulk insert calls, successful or not
    pub fn sample_writes(&self) -> usize {
        self.sample_writes.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceStore for MemoryStore {
    async fn insert_samples(&self, samples: &[PriceSample]) -> Result<InsertReport, StoreError> {
        self.sample_writes.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let mut stored = self.samples.write().await;
        stored.extend_from_slice(samples);
        Ok(InsertReport::all(samples.len()))
    }

    async fn insert_snapshot(&self, snapshot: &MinuteSnapshot) -> Result<(), StoreError> {
        self.check_available()?;

        let mut stored = self.snapshots.write().await;
        stored.push(snapshot.clone());
        Ok(())
    }
}
