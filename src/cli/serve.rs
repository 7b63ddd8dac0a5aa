//! Serve command implementation

use crate::config::Config;
use crate::data::{MemoryStore, ParquetStore, PriceStore};
use crate::feed::JupiterClient;
use crate::pipeline::Pipeline;
use crate::ws::{ServerOptions, SubscriberServer};
use clap::Args;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Keep samples in memory instead of writing Parquet files
    #[arg(long)]
    pub memory_store: bool,

    /// Listen port, overriding the config file and PORT
    #[arg(short, long)]
    pub port: Option<u16>,
}

impl ServeArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let mut server = config.server.clone();
        if let Some(port) = self.port {
            server.port = port;
        }

        let source = Arc::new(JupiterClient::with_config(config.upstream.client_config())?);
        let store: Arc<dyn PriceStore> = if self.memory_store {
            tracing::info!("Using in-memory store; samples are not persisted");
            Arc::new(MemoryStore::new())
        } else {
            let store = ParquetStore::new(config.persistence.output_dir.clone());
            store.ensure_dir()?;
            tracing::info!(output_dir = ?store.output_dir(), "Writing samples to Parquet");
            Arc::new(store)
        };

        let pipeline = Arc::new(Pipeline::new(config.pipeline(), source, store));

        let options = ServerOptions::new(server.bind_addr()?)
            .allowed_origins(server.allowed_origins.clone())
            .ping_interval(server.ping_interval())
            .outbound_buffer(server.outbound_buffer);
        let subscriber_server = SubscriberServer::bind(options, pipeline.clone()).await?;

        subscriber_server.run(shutdown_signal()).await?;

        pipeline.shutdown().await;
        let stats = pipeline.stats().await;
        tracing::info!(
            poll_cycles = stats.poll_cycles,
            samples_written = stats.samples_written,
            samples_dropped = stats.samples_dropped,
            snapshots_written = stats.snapshots_written,
            "Shutdown complete"
        );

        Ok(())
    }
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
