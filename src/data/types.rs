//! Persistence record types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use thiserror::Error;

/// Latest price of each required symbol, captured once per snapshot interval
#[derive(Debug, Clone, PartialEq)]
pub struct MinuteSnapshot {
    /// Symbol -> price; always holds every required symbol
    pub values: BTreeMap<String, Decimal>,
    pub captured_at: DateTime<Utc>,
}

/// A record the store refused as part of a bulk insert
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRecord {
    /// Position in the submitted batch
    pub index: usize,
    pub reason: String,
}

/// Result of a bulk insert that reached the store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertReport {
    pub inserted: usize,
    pub rejected: Vec<RejectedRecord>,
}

impl InsertReport {
    /// Report for a batch accepted in full
    pub fn all(count: usize) -> Self {
        Self {
            inserted: count,
            rejected: Vec::new(),
        }
    }
}

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store could not be reached at call time
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    /// Write reached the store but failed as a whole
    #[error("Write failed: {0}")]
    WriteFailed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
