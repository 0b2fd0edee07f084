//! # CNS Agent
//!
//! Runs on every node and owns the pod IP pool of the node's network
//! containers.
//!
//! ## Usage
//! ```bash
//! cns-agent --config /etc/cns/cns-agent.yaml
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use cns_agent::cli::Args;
use cns_agent::config::Config;
use cns_agent::server;

const DEFAULT_CONFIG_PATH: &str = "/etc/cns/cns-agent.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration; logging is configured from it
    let (config, source) = match &args.config {
        Some(config_path) => (Config::load(config_path)?.with_cli_overrides(&args), Some(config_path.clone())),
        None => match Config::load(DEFAULT_CONFIG_PATH) {
            Ok(cfg) => (cfg.with_cli_overrides(&args), Some(DEFAULT_CONFIG_PATH.to_string())),
            Err(_) => (Config::default().with_cli_overrides(&args), None),
        },
    };

    cns_common::init_logging(&config.logging.level, config.logging.format)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting CNS agent");
    match source {
        Some(path) => info!(config_path = %path, "Configuration loaded"),
        None => info!("No config file found, using CLI arguments and defaults"),
    }
    info!(
        listen = %config.server.listen_address,
        channel_mode = %config.channel_mode,
        state_path = %config.store.state_path.display(),
        "CNS agent configured"
    );

    if let Err(e) = server::run(config).await {
        error!(error = %e, "Server failed");
        return Err(e);
    }

    Ok(())
}
