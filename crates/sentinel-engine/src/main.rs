//! Sentinel — risk-gated order execution core.

use anyhow::Context;
use clap::Parser;
use sentinel_engine::{Application, EngineConfig};
use sentinel_telemetry::init_logging;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sentinel", about = "Risk-gated order execution core")]
struct Args {
    /// Path to the TOML config file (falls back to SENTINEL_CONFIG).
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging().context("Failed to initialize logging")?;

    let args = Args::parse();
    let config_path = args
        .config
        .or_else(|| std::env::var("SENTINEL_CONFIG").ok())
        .unwrap_or_else(|| "config/sentinel.toml".to_string());

    info!(config = %config_path, "Loading configuration");
    let config = EngineConfig::load(&config_path)
        .with_context(|| format!("Failed to load config from {config_path}"))?;

    let app = Application::new(config).context("Failed to assemble engine")?;
    app.run().await.context("Engine exited with error")?;

    Ok(())
}
