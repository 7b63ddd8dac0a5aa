//! Persistence
//!
//! Stores raw price samples in bulk and one consolidated snapshot per minute

mod memory;
mod parquet;
mod types;

pub use memory::MemoryStore;
pub use self::parquet::{
    ParquetReader, ParquetStore, ParquetWriter, SAMPLES_PREFIX, SNAPSHOTS_PREFIX,
};
pub use types::{InsertReport, MinuteSnapshot, RejectedRecord, StoreError};

use crate::feed::PriceSample;
use async_trait::async_trait;

/// Trait for persistence implementations
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Bulk insert; individual rejections are reported, not raised
    async fn insert_samples(&self, samples: &[PriceSample]) -> Result<InsertReport, StoreError>;
    /// Insert a single snapshot record
    async fn insert_snapshot(&self, snapshot: &MinuteSnapshot) -> Result<(), StoreError>;
}
