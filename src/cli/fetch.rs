//! Fetch command implementation

use crate::config::Config;
use crate::feed::{JupiterClient, PriceSource};
use chrono::Utc;
use clap::Args;

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Pretty-print the JSON output
    #[arg(short, long)]
    pub pretty: bool,
}

impl FetchArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let client = JupiterClient::with_config(config.upstream.client_config())?;
        let symbols = config.tracked_symbols();

        let quote = client.fetch(&symbols).await?;
        tracing::info!(
            requested = symbols.len(),
            priced = quote.price_count(),
            "Fetched upstream prices"
        );

        let samples = quote.samples(&symbols, Utc::now());
        let json = if self.pretty {
            serde_json::to_string_pretty(&samples)?
        } else {
            serde_json::to_string(&samples)?
        };
        println!("{}", json);

        Ok(())
    }
}
