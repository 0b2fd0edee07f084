//! Command-line argument parsing.

use clap::{Parser, ValueEnum};
use cns_types::ChannelMode;

/// CNS Agent - node-local container networking service
#[derive(Parser, Debug)]
#[command(name = "cns-agent")]
#[command(about = "CNS Agent - node-local container networking service")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (optional, defaults used if not found)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,

    /// Listen address for the HTTP API
    #[arg(long)]
    pub listen: Option<String>,

    /// Path of the persisted service state
    #[arg(long)]
    pub state_path: Option<std::path::PathBuf>,

    /// How network container goal state reaches the agent
    #[arg(long, value_enum)]
    pub channel_mode: Option<ChannelModeArg>,

    /// Node ID on the cluster controller (hostname if not provided)
    #[arg(long)]
    pub node_id: Option<String>,

    /// Base URL of the host networking agent
    #[arg(long, env = "CNS_NMAGENT_URL")]
    pub nmagent_url: Option<String>,

    /// Maintain per infra container endpoint state
    #[arg(long)]
    pub manage_endpoint_state: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChannelModeArg {
    Direct,
    Managed,
    Crd,
    AzureHost,
}

impl From<ChannelModeArg> for ChannelMode {
    fn from(arg: ChannelModeArg) -> Self {
        match arg {
            ChannelModeArg::Direct => ChannelMode::Direct,
            ChannelModeArg::Managed => ChannelMode::Managed,
            ChannelModeArg::Crd => ChannelMode::CRD,
            ChannelModeArg::AzureHost => ChannelMode::AzureHost,
        }
    }
}
