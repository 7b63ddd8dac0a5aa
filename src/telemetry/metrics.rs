//! Prometheus metrics

use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// One upstream request
    UpstreamFetch,
    /// One store write
    StoreWrite,
}

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Poll cycles started
    PollCycles,
    /// Upstream attempts that were retried
    UpstreamRetries,
    /// Cycles abandoned after a permanent error or exhausted retries
    CyclesFailed,
    /// Valid samples produced by the poller
    SamplesProduced,
    /// Samples the store accepted
    SamplesWritten,
    /// Samples the store rejected individually
    SamplesRejected,
    /// Samples lost with a failed flush
    SamplesDropped,
    /// Snapshots written
    SnapshotsWritten,
    /// Snapshot ticks skipped for missing values
    SnapshotsSkipped,
    /// Snapshots lost to a failed store write
    SnapshotsDropped,
    /// Broadcasts sent
    Broadcasts,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Connected subscribers
    Subscribers,
    /// Samples waiting for the next flush
    BufferedSamples,
}

fn latency_name(metric: LatencyMetric) -> &'static str {
    match metric {
        LatencyMetric::UpstreamFetch => "jlprelay_upstream_fetch_latency_ms",
        LatencyMetric::StoreWrite => "jlprelay_store_write_latency_ms",
    }
}

fn counter_name(metric: CounterMetric) -> &'static str {
    match metric {
        CounterMetric::PollCycles => "jlprelay_poll_cycles_total",
        CounterMetric::UpstreamRetries => "jlprelay_upstream_retries_total",
        CounterMetric::CyclesFailed => "jlprelay_poll_cycles_failed_total",
        CounterMetric::SamplesProduced => "jlprelay_samples_produced_total",
        CounterMetric::SamplesWritten => "jlprelay_samples_written_total",
        CounterMetric::SamplesRejected => "jlprelay_samples_rejected_total",
        CounterMetric::SamplesDropped => "jlprelay_samples_dropped_total",
        CounterMetric::SnapshotsWritten => "jlprelay_snapshots_written_total",
        CounterMetric::SnapshotsSkipped => "jlprelay_snapshots_skipped_total",
        CounterMetric::SnapshotsDropped => "jlprelay_snapshots_dropped_total",
        CounterMetric::Broadcasts => "jlprelay_broadcasts_total",
    }
}

fn gauge_name(metric: GaugeMetric) -> &'static str {
    match metric {
        GaugeMetric::Subscribers => "jlprelay_subscribers",
        GaugeMetric::BufferedSamples => "jlprelay_buffered_samples",
    }
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    ::metrics::histogram!(latency_name(metric)).record(duration.as_secs_f64() * 1000.0);
}

/// Increment a counter
pub fn increment(metric: CounterMetric, by: u64) {
    if by > 0 {
        ::metrics::counter!(counter_name(metric)).increment(by);
    }
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    ::metrics::gauge!(gauge_name(metric)).set(value);
}
