//! Automation hub server
//!
//! Usage: `automation-hub [CONFIG_DIR]`. The config directory defaults to
//! `$HUB_CONFIG_DIR`, then the current directory.

use anyhow::{anyhow, Context, Result};
use hub_config::HubConfig;
use hub_server::Hub;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn config_dir() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("HUB_CONFIG_DIR").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(default_level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level)
            .with_context(|| format!("invalid logger.level {default_level:?}"))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow!(e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_dir = config_dir();
    let config = HubConfig::load(&config_dir)
        .with_context(|| format!("failed to load configuration from {}", config_dir.display()))?;

    init_tracing(&config.logger.level)?;
    info!(config_dir = %config_dir.display(), "Starting automation hub");

    let hub = Hub::new(&config, &config_dir).await?;
    hub.start()?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    hub.shutdown().await
}
