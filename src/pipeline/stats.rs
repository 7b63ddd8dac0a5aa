//! Running counters for the pipeline

use std::sync::Arc;
use tokio::sync::RwLock;

/// Pipeline statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PipelineStats {
    pub poll_cycles: u64,
    pub cycles_failed: u64,
    pub samples_produced: u64,
    pub samples_buffered: u64,
    pub samples_written: u64,
    pub samples_rejected: u64,
    pub samples_dropped: u64,
    pub batches_written: u64,
    pub snapshots_written: u64,
    pub snapshots_skipped: u64,
    pub snapshots_dropped: u64,
    pub broadcasts: u64,
}

pub type StatsHandle = Arc<RwLock<PipelineStats>>;
