//! CLI interface for jlp-relay
//!
//! Provides subcommands for:
//! - `serve`: Run the subscriber server and price pipeline
//! - `fetch`: Query the upstream once and print the samples
//! - `config`: Show the effective configuration

mod fetch;
mod serve;

pub use fetch::FetchArgs;
pub use serve::ServeArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "jlp-relay")]
#[command(about = "Polls Jupiter token prices, persists them and streams live updates over WebSocket")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the subscriber server and price pipeline
    Serve(ServeArgs),
    /// Query the upstream once and print the samples as JSON
    Fetch(FetchArgs),
    /// Show the effective configuration
    Config,
}
