//! jlp-relay: Jupiter price relay
//!
//! This library provides the core components for:
//! - Batched price queries against the Jupiter price API
//! - Polling with retry and exponential backoff
//! - Buffered bulk persistence and per-minute snapshots to Parquet
//! - WebSocket fan-out of live prices to browser subscribers
//! - Subscriber-driven start and stop of all background work
//! - Structured logging and Prometheus metrics

pub mod cli;
pub mod config;
pub mod data;
pub mod feed;
pub mod pipeline;
pub mod telemetry;
pub mod ws;
