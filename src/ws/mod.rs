//! WebSocket subscriber server
//!
//! Accepts browser subscribers from an origin allow-list and pushes every
//! price update to them, with ping/pong keepalive.

mod server;
mod types;

pub use server::SubscriberServer;
pub use types::{ServerOptions, WsError};
