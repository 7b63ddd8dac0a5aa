//! Configuration types for jlp-relay

use crate::feed::{JupiterConfig, RetryPolicy, TrackedSymbol, JUPITER_PRICE_URL};
use crate::pipeline::PipelineConfig;
use crate::telemetry::LogFormat;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Bundled example configuration, used when no config file can be read
pub const EXAMPLE_CONFIG: &str = include_str!("../config.toml.example");

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default = "default_symbols")]
    pub symbols: Vec<SymbolConfig>,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Upstream price API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// One tracked token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SymbolConfig {
    pub symbol: String,
    /// Token mint address the upstream is queried with
    pub source_key: String,
}

/// Poll cadence and retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Delay between the end of one cycle and the start of the next
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Attempt `n` backs off `2^n` units
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,
    /// Symbols buffered for persistence; empty means all
    #[serde(default)]
    pub persist_symbols: Vec<String>,
}

/// Sample persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

/// Snapshot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default = "default_snapshot_interval_ms")]
    pub interval_ms: u64,
    /// Every one of these must be cached for a snapshot to be written
    #[serde(default = "default_required_symbols")]
    pub required_symbols: Vec<String>,
}

/// Subscriber server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    /// Outbound messages queued per subscriber before updates are skipped
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Prometheus exporter port; no exporter when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no symbols configured")]
    NoSymbols,
    #[error("symbol {0} configured more than once")]
    DuplicateSymbol(String),
    #[error("snapshot symbol {0} is not tracked")]
    UnknownSnapshotSymbol(String),
    #[error("persist symbol {0} is not tracked")]
    UnknownPersistSymbol(String),
    #[error("poller.max_attempts must be at least 1")]
    ZeroAttempts,
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
    #[error("server.allowed_origins is empty")]
    NoAllowedOrigins,
    #[error("invalid bind address {0}")]
    InvalidBindAddress(String),
    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

fn default_symbols() -> Vec<SymbolConfig> {
    [
        ("JLP", "27G8MtK7VtTcCHkpASjSDdkWWYfoqT6ggEuKidVJidD4"),
        ("SOL", "So11111111111111111111111111111111111111112"),
        ("USDC", "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
    ]
    .into_iter()
    .map(|(symbol, source_key)| SymbolConfig {
        symbol: symbol.to_string(),
        source_key: source_key.to_string(),
    })
    .collect()
}
fn default_base_url() -> String {
    JUPITER_PRICE_URL.to_string()
}
fn default_timeout_ms() -> u64 {
    5_000
}
fn default_poll_interval_ms() -> u64 {
    1_000
}
fn default_max_attempts() -> u32 {
    5
}
fn default_backoff_unit_ms() -> u64 {
    1_000
}
fn default_flush_interval_ms() -> u64 {
    5_000
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_snapshot_interval_ms() -> u64 {
    60_000
}
fn default_required_symbols() -> Vec<String> {
    vec!["JLP".to_string(), "SOL".to_string()]
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    10_000
}
fn default_allowed_origins() -> Vec<String> {
    vec![
        "https://solmate-weld.vercel.app".to_string(),
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
    ]
}
fn default_ping_interval_ms() -> u64 {
    30_000
}
fn default_outbound_buffer() -> usize {
    64
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            max_attempts: default_max_attempts(),
            backoff_unit_ms: default_backoff_unit_ms(),
            persist_symbols: Vec::new(),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            output_dir: default_output_dir(),
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_snapshot_interval_ms(),
            required_symbols: default_required_symbols(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
            ping_interval_ms: default_ping_interval_ms(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_port: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            symbols: default_symbols(),
            poller: PollerConfig::default(),
            persistence: PersistenceConfig::default(),
            snapshot: SnapshotConfig::default(),
            server: ServerConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl UpstreamConfig {
    pub fn client_config(&self) -> JupiterConfig {
        JupiterConfig {
            base_url: self.base_url.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse()
            .map_err(|_| ConfigError::InvalidBindAddress(addr))
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply `PORT`, `JLP_TOKEN_ID`, `FAST_FETCH_INTERVAL_MS` and `DB_SAVE_INTERVAL_MS`
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(port) = lookup("PORT") {
            self.server.port = parse_env("PORT", port)?;
        }
        if let Some(token_id) = lookup("JLP_TOKEN_ID") {
            if let Some(jlp) = self.symbols.iter_mut().find(|s| s.symbol == "JLP") {
                jlp.source_key = token_id;
            }
        }
        if let Some(interval) = lookup("FAST_FETCH_INTERVAL_MS") {
            self.poller.interval_ms = parse_env("FAST_FETCH_INTERVAL_MS", interval)?;
        }
        if let Some(interval) = lookup("DB_SAVE_INTERVAL_MS") {
            self.persistence.flush_interval_ms = parse_env("DB_SAVE_INTERVAL_MS", interval)?;
        }
        Ok(self)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::NoSymbols);
        }

        let mut tracked = HashSet::new();
        for symbol in &self.symbols {
            if !tracked.insert(symbol.symbol.as_str()) {
                return Err(ConfigError::DuplicateSymbol(symbol.symbol.clone()));
            }
        }

        if let Some(unknown) = self
            .snapshot
            .required_symbols
            .iter()
            .find(|s| !tracked.contains(s.as_str()))
        {
            return Err(ConfigError::UnknownSnapshotSymbol(unknown.clone()));
        }
        if let Some(unknown) = self
            .poller
            .persist_symbols
            .iter()
            .find(|s| !tracked.contains(s.as_str()))
        {
            return Err(ConfigError::UnknownPersistSymbol(unknown.clone()));
        }

        if self.poller.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }

        for (name, value) in [
            ("poller.interval_ms", self.poller.interval_ms),
            ("poller.backoff_unit_ms", self.poller.backoff_unit_ms),
            ("persistence.flush_interval_ms", self.persistence.flush_interval_ms),
            ("snapshot.interval_ms", self.snapshot.interval_ms),
            ("server.ping_interval_ms", self.server.ping_interval_ms),
            ("upstream.timeout_ms", self.upstream.timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroInterval(name));
            }
        }

        if self.server.allowed_origins.is_empty() {
            return Err(ConfigError::NoAllowedOrigins);
        }
        self.server.bind_addr()?;

        Ok(())
    }

    pub fn tracked_symbols(&self) -> Vec<TrackedSymbol> {
        self.symbols
            .iter()
            .map(|s| TrackedSymbol::new(s.symbol.clone(), s.source_key.clone()))
            .collect()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.poller.max_attempts,
            backoff_unit: Duration::from_millis(self.poller.backoff_unit_ms),
        }
    }

    /// Runtime settings for the ingestion pipeline
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            symbols: self.tracked_symbols(),
            retry: self.retry_policy(),
            poll_interval: Duration::from_millis(self.poller.interval_ms),
            persist_symbols: self.poller.persist_symbols.clone(),
            flush_interval: Duration::from_millis(self.persistence.flush_interval_ms),
            snapshot_interval: Duration::from_millis(self.snapshot.interval_ms),
            snapshot_symbols: self.snapshot.required_symbols.clone(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { name, value })
}
