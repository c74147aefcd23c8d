//! Campaign engine server: REST API plus background liveness sweep

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use rvoip_campaign_engine::config::CampaignEngineConfig;
use rvoip_campaign_engine::logging::setup_logging;
use rvoip_campaign_engine::server::CampaignServerBuilder;

#[derive(Parser, Debug)]
#[command(name = "campaign-server")]
#[command(about = "Agent liveness and SIP provisioning service for calling campaigns")]
pub struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to serve the REST API on, overrides the config file
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Log level, overrides the config file
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        CampaignEngineConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if args.json_logs {
        config.logging.json = true;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    setup_logging(&config.logging)?;

    info!("🧪 Campaign engine starting...");
    info!("🗄️ Database: {}", config.database.url);
    info!(
        "⏰ Stale threshold: {}ms, sweep every {}ms",
        config.liveness.stale_threshold_ms, config.liveness.sweep_interval_ms
    );

    let mut server = CampaignServerBuilder::new()
        .with_config(config)
        .build()
        .await
        .context("Failed to build campaign server")?;
    server.start().await?;

    info!("🛑 Press Ctrl+C to stop the server");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    server.stop().await?;
    Ok(())
}
