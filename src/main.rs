use clap::Parser;
use jlp_relay::cli::{Cli, Commands};
use jlp_relay::config::{Config, EXAMPLE_CONFIG};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
            eprintln!("Using bundled example configuration");
            Config::parse(EXAMPLE_CONFIG)?
        }
    };
    let config = config.with_env_overrides()?;
    config.validate()?;

    // Initialize telemetry
    jlp_relay::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Serve(args) => {
            tracing::info!(symbols = config.symbols.len(), "Starting price relay");
            args.execute(&config).await?;
        }
        Commands::Fetch(args) => {
            args.execute(&config).await?;
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
