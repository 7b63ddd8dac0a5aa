//! Parquet-backed price store
//!
//! Every flushed batch and every snapshot lands in its own SNAPPY-compressed
//! file under the output directory.

use super::{InsertReport, MinuteSnapshot, PriceStore, RejectedRecord, StoreError};
use crate::feed::PriceSample;
use arrow::array::{ArrayRef, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use rust_decimal::Decimal;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// File prefix for price sample batches
pub const SAMPLES_PREFIX: &str = "price_samples";
/// File prefix for minute snapshots
pub const SNAPSHOTS_PREFIX: &str = "minute_snapshots";

fn timestamp_field() -> Field {
    Field::new(
        "timestamp",
        DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        false,
    )
}

/// Price sample schema fields
pub fn price_sample_schema() -> Schema {
    Schema::new(vec![
        timestamp_field(),
        Field::new("symbol", DataType::Utf8, false),
        Field::new("price", DataType::Utf8, false), // Store as string for Decimal precision
        Field::new("token_id", DataType::Utf8, false),
    ])
}

/// Minute snapshot schema: one row per symbol, rows of a snapshot share a timestamp
pub fn snapshot_schema() -> Schema {
    Schema::new(vec![
        timestamp_field(),
        Field::new("symbol", DataType::Utf8, false),
        Field::new("price", DataType::Utf8, false),
    ])
}

/// Writes record batches to uniquely named Parquet files
pub struct ParquetWriter {
    output_dir: PathBuf,
    sequence: AtomicU64,
}

impl ParquetWriter {
    /// Create a new Parquet writer
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            sequence: AtomicU64::new(0),
        }
    }

    /// Ensure output directory exists
    pub fn ensure_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.output_dir).map_err(|e| {
            StoreError::Unavailable(format!("{}: {}", self.output_dir.display(), e))
        })
    }

    /// Generate a file path; the sequence suffix keeps same-millisecond writes apart
    pub fn file_path(&self, prefix: &str, timestamp: DateTime<Utc>) -> PathBuf {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let filename = format!(
            "{}_{}_{:06}.parquet",
            prefix,
            timestamp.format("%Y%m%d_%H%M%S_%3f"),
            seq
        );
        self.output_dir.join(filename)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn write_batch(&self, path: &Path, batch: RecordBatch) -> Result<(), StoreError> {
        self.ensure_dir()?;

        let file = File::create(path)?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();

        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;
        writer
            .write(&batch)
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;
        writer
            .close()
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;

        Ok(())
    }

    /// Write price samples to a Parquet file
    pub fn write_samples(&self, path: &Path, samples: &[PriceSample]) -> Result<(), StoreError> {
        if samples.is_empty() {
            return Ok(());
        }

        let timestamps: Vec<i64> = samples
            .iter()
            .map(|s| s.observed_at.timestamp_micros())
            .collect();
        let symbols: Vec<&str> = samples.iter().map(|s| s.symbol.as_str()).collect();
        let prices: Vec<String> = samples.iter().map(|s| s.price.to_string()).collect();
        let token_ids: Vec<&str> = samples.iter().map(|s| s.source_key.as_str()).collect();

        let batch = RecordBatch::try_new(
            Arc::new(price_sample_schema()),
            vec![
                Arc::new(TimestampMicrosecondArray::from(timestamps).with_timezone("UTC"))
                    as ArrayRef,
                Arc::new(StringArray::from(symbols)) as ArrayRef,
                Arc::new(StringArray::from(
                    prices.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
                )) as ArrayRef,
                Arc::new(StringArray::from(token_ids)) as ArrayRef,
            ],
        )
        .map_err(|e| StoreError::WriteFailed(e.to_string()))?;

        self.write_batch(path, batch)?;

        tracing::debug!(path = ?path, count = samples.len(), "Wrote price samples to Parquet");

        Ok(())
    }

    /// Write one snapshot to a Parquet file
    pub fn write_snapshot(&self, path: &Path, snapshot: &MinuteSnapshot) -> Result<(), StoreError> {
        let captured_at = snapshot.captured_at.timestamp_micros();
        let timestamps: Vec<i64> = vec![captured_at; snapshot.values.len()];
        let symbols: Vec<&str> = snapshot.values.keys().map(|s| s.as_str()).collect();
        let prices: Vec<String> = snapshot.values.values().map(|p| p.to_string()).collect();

        let batch = RecordBatch::try_new(
            Arc::new(snapshot_schema()),
            vec![
                Arc::new(TimestampMicrosecondArray::from(timestamps).with_timezone("UTC"))
                    as ArrayRef,
                Arc::new(StringArray::from(symbols)) as ArrayRef,
                Arc::new(StringArray::from(
                    prices.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
                )) as ArrayRef,
            ],
        )
        .map_err(|e| StoreError::WriteFailed(e.to_string()))?;

        self.write_batch(path, batch)?;

        tracing::debug!(path = ?path, "Wrote minute snapshot to Parquet");

        Ok(())
    }
}

/// Store that persists to Parquet files
pub struct ParquetStore {
    writer: Arc<ParquetWriter>,
}

impl ParquetStore {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            writer: Arc::new(ParquetWriter::new(output_dir)),
        }
    }

    pub fn output_dir(&self) -> &Path {
        self.writer.output_dir()
    }

    /// Create the output directory up front so a bad path fails at startup
    pub fn ensure_dir(&self) -> Result<(), StoreError> {
        self.writer.ensure_dir()
    }

    /// Sorted list of files written with the given prefix
    pub fn files(&self, prefix: &str) -> anyhow::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        if !self.output_dir().exists() {
            return Ok(files);
        }
        for entry in fs::read_dir(self.output_dir())? {
            let path = entry?.path();
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(prefix) && n.ends_with(".parquet"));
            if matches {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Split a batch into writable samples and rejections
fn validate_samples(samples: &[PriceSample]) -> (Vec<PriceSample>, Vec<RejectedRecord>) {
    let mut valid = Vec::with_capacity(samples.len());
    let mut rejected = Vec::new();

    for (index, sample) in samples.iter().enumerate() {
        if sample.symbol.is_empty() {
            rejected.push(RejectedRecord {
                index,
                reason: "empty symbol".to_string(),
            });
        } else if sample.price < Decimal::ZERO {
            rejected.push(RejectedRecord {
                index,
                reason: format!("negative price {}", sample.price),
            });
        } else {
            valid.push(sample.clone());
        }
    }

    (valid, rejected)
}

#[async_trait]
impl PriceStore for ParquetStore {
    async fn insert_samples(&self, samples: &[PriceSample]) -> Result<InsertReport, StoreError> {
        let (valid, rejected) = validate_samples(samples);
        let inserted = valid.len();

        if inserted > 0 {
            let writer = self.writer.clone();
            let path = writer.file_path(SAMPLES_PREFIX, Utc::now());
            let started = Instant::now();

            tokio::task::spawn_blocking(move || writer.write_samples(&path, &valid))
                .await
                .map_err(|e| StoreError::WriteFailed(e.to_string()))??;

            crate::telemetry::record_latency(
                crate::telemetry::LatencyMetric::StoreWrite,
                started.elapsed(),
            );
        }

        Ok(InsertReport { inserted, rejected })
    }

    async fn insert_snapshot(&self, snapshot: &MinuteSnapshot) -> Result<(), StoreError> {
        let writer = self.writer.clone();
        let path = writer.file_path(SNAPSHOTS_PREFIX, snapshot.captured_at);
        let snapshot = snapshot.clone();

        tokio::task::spawn_blocking(move || writer.write_snapshot(&path, &snapshot))
            .await
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?
    }
}

/// Reader for price sample files
pub struct ParquetReader {
    path: PathBuf,
}

impl ParquetReader {
    /// Create a new reader for a Parquet file
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Read price samples from a Parquet file
    pub fn read_samples(&self) -> anyhow::Result<Vec<PriceSample>> {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
        use std::str::FromStr;

        let file = File::open(&self.path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let reader = builder.build()?;

        let mut samples = Vec::new();

        for batch_result in reader {
            let batch = batch_result?;

            let timestamps = batch
                .column(0)
                .as_any()
                .downcast_ref::<TimestampMicrosecondArray>()
                .ok_or_else(|| anyhow::anyhow!("Invalid timestamp column"))?;

            let symbols = batch
                .column(1)
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| anyhow::anyhow!("Invalid symbol column"))?;

            let prices = batch
                .column(2)
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| anyhow::anyhow!("Invalid price column"))?;

            let token_ids = batch
                .column(3)
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| anyhow::anyhow!("Invalid token_id column"))?;

            for i in 0..batch.num_rows() {
                let observed_at = DateTime::from_timestamp_micros(timestamps.value(i))
                    .ok_or_else(|| anyhow::anyhow!("Invalid timestamp"))?;

                samples.push(PriceSample {
                    symbol: symbols.value(i).to_string(),
                    price: Decimal::from_str(prices.value(i))?,
                    source_key: token_ids.value(i).to_string(),
                    observed_at,
                });
            }
        }

        Ok(samples)
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}
