// Beacon node agent
// Main entry point for the beacon binary

use beacon_engine::cli::{Cli, Command};
use beacon_engine::config::Config;
use beacon_engine::handlers::{handle_agent, handle_bench, OutputFormat};
use beacon_engine::telemetry::init_telemetry;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let config = match &cli.config {
        Some(config_path) => Config::load_or_create_at(config_path)?,
        None => Config::load_or_create()?,
    };

    // RUST_LOG still takes precedence over the configured level
    init_telemetry(&config.core);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Beacon v{} ({} - {})", version, commit, timestamp);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Command::Agent => {
            tracing::info!("Starting agent for node {}", config.node.name);
            handle_agent(&config, format).await
        }

        Command::Bench { requests, strategy } => {
            tracing::info!("Running wait strategy benchmark");
            handle_bench(&config, requests, strategy, format).await
        }
    }
}
