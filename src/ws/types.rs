//! WebSocket server types and configuration

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Subscriber server configuration
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Address to listen on
    pub bind_addr: SocketAddr,
    /// Exact `Origin` header values allowed to connect
    pub allowed_origins: Vec<String>,
    /// Interval for sending keepalive pings
    pub ping_interval: Duration,
    /// Outbound messages queued per connection before updates are skipped
    pub outbound_buffer: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 10_000)),
            allowed_origins: Vec::new(),
            ping_interval: Duration::from_secs(30),
            outbound_buffer: 64,
        }
    }
}

impl ServerOptions {
    /// Create options listening on the given address
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Allow an origin
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origins.push(origin.into());
        self
    }

    /// Replace the allowed origins
    pub fn allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }

    /// Set ping interval
    pub fn ping_interval(mut self, d: Duration) -> Self {
        self.ping_interval = d;
        self
    }

    /// Set per-connection outbound queue size
    pub fn outbound_buffer(mut self, n: usize) -> Self {
        self.outbound_buffer = n;
        self
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|allowed| allowed == origin)
    }
}

/// WebSocket errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WsError {
    /// Listener could not be bound
    #[error("Bind failed: {0}")]
    BindFailed(String),
    /// Upgrade handshake failed or was refused
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),
    /// Connection broke while streaming
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    /// Send failed
    #[error("Send failed: {0}")]
    SendFailed(String),
    /// No pong between two pings
    #[error("Pong timeout")]
    PongTimeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_options_default() {
        let options = ServerOptions::default();
        assert_eq!(options.bind_addr.port(), 10_000);
        assert_eq!(options.ping_interval, Duration::from_secs(30));
        assert_eq!(options.outbound_buffer, 64);
        assert!(options.allowed_origins.is_empty());
    }

    #[test]
    fn test_server_options_builder() {
        let options = ServerOptions::new(SocketAddr::from(([127, 0, 0, 1], 0)))
            .allow_origin("http://localhost:3000")
            .allow_origin("http://localhost:5173")
            .ping_interval(Duration::from_secs(15))
            .outbound_buffer(8);

        assert_eq!(options.bind_addr.port(), 0);
        assert_eq!(options.allowed_origins.len(), 2);
        assert_eq!(options.ping_interval, Duration::from_secs(15));
        assert_eq!(options.outbound_buffer, 8);
    }

    #[test]
    fn test_origin_match_is_exact() {
        let options = ServerOptions::default().allow_origin("http://localhost:3000");

        assert!(options.is_allowed("http://localhost:3000"));
        assert!(!options.is_allowed("http://localhost:3000/"));
        assert!(!options.is_allowed("http://localhost:30001"));
        assert!(!options.is_allowed("https://evil.example"));
    }

    #[test]
    fn test_ws_error_display() {
        let err = WsError::ConnectionFailed("reset".to_string());
        assert_eq!(err.to_string(), "Connection failed: reset");
        assert_eq!(WsError::PongTimeout.to_string(), "Pong timeout");
    }
}
