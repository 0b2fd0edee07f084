//! Configuration management for the CNS agent.

use anyhow::{Context, Result};
use cns_common::LogFormat;
use cns_types::{ChannelMode, HostIPInfo};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::Args;

/// Main configuration structure.
///
/// Top-level keys keep the option names operators already use in their
/// config files.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "ChannelMode")]
    pub channel_mode: ChannelMode,
    /// Maintain the per infra container endpoint store
    #[serde(rename = "ManageEndpointState")]
    pub manage_endpoint_state: bool,
    /// Program SNAT rules for NCs that talk to the host
    #[serde(rename = "ProgramSNATIPTables")]
    pub program_snat_iptables: bool,
    /// Cluster controller endpoint (Managed mode)
    #[serde(rename = "PrivateEndpoint")]
    pub private_endpoint: String,
    /// Infrastructure virtual network of the node (Managed mode)
    #[serde(rename = "InfrastructureNetworkID")]
    pub infrastructure_network_id: String,
    /// Node identity on the cluster controller; hostname when empty
    #[serde(rename = "NodeID")]
    pub node_id: String,
    #[serde(rename = "DncApiVersion")]
    pub dnc_api_version: String,
    /// Outbound connect timeout in seconds
    #[serde(rename = "HttpConnectionTimeout")]
    pub http_connection_timeout: u64,
    /// Outbound response timeout in seconds
    #[serde(rename = "HttpResponseHeaderTimeout")]
    pub http_response_header_timeout: u64,
    /// Directory holding the CNI plugin binaries
    #[serde(rename = "NetPluginPath")]
    pub net_plugin_path: String,
    /// CNI network configuration handed to the plugin
    #[serde(rename = "NetPluginConfigFile")]
    pub net_plugin_config_file: String,
    #[serde(rename = "Server")]
    pub server: ServerConfig,
    #[serde(rename = "Store")]
    pub store: StoreConfig,
    #[serde(rename = "NmAgent")]
    pub nmagent: NmAgentConfig,
    #[serde(rename = "Reconcilers")]
    pub reconcilers: ReconcilerConfig,
    #[serde(rename = "Conflist")]
    pub conflist: ConflistConfig,
    #[serde(rename = "Logging")]
    pub logging: LoggingConfig,
    /// Primary interface of the host, returned with every pod IP
    #[serde(rename = "HostPrimaryInterface")]
    pub host_primary_interface: HostIPInfo,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel_mode: ChannelMode::Direct,
            manage_endpoint_state: false,
            program_snat_iptables: false,
            private_endpoint: String::new(),
            infrastructure_network_id: String::new(),
            node_id: String::new(),
            dnc_api_version: "2018-03-01".to_string(),
            http_connection_timeout: 5,
            http_response_header_timeout: 120,
            net_plugin_path: "/opt/cni/bin".to_string(),
            net_plugin_config_file: "/etc/cni/net.d/10-azure.conflist".to_string(),
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            nmagent: NmAgentConfig::default(),
            reconcilers: ReconcilerConfig::default(),
            conflist: ConflistConfig::default(),
            logging: LoggingConfig::default(),
            host_primary_interface: HostIPInfo::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config =
            serde_yaml::from_str(&content).with_context(|| "Failed to parse config file")?;

        Ok(config)
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Self {
        if let Some(ref listen) = args.listen {
            self.server.listen_address = listen.clone();
        }

        if let Some(ref state_path) = args.state_path {
            self.store.state_path = state_path.clone();
        }

        if let Some(mode) = args.channel_mode {
            self.channel_mode = mode.into();
        }

        if let Some(ref node_id) = args.node_id {
            self.node_id = node_id.clone();
        }

        if let Some(ref url) = args.nmagent_url {
            self.nmagent.base_url = url.clone();
        }

        if args.manage_endpoint_state {
            self.manage_endpoint_state = true;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }

        if args.log_json {
            self.logging.format = LogFormat::Json;
        }

        self
    }

    /// Node id to present to the cluster controller.
    pub fn node_id(&self) -> String {
        if !self.node_id.is_empty() {
            return self.node_id.clone();
        }
        hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.http_connection_timeout)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.http_response_header_timeout)
    }
}

/// HTTP API server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ServerConfig {
    /// Address to listen on
    pub listen_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1:10090".to_string(),
        }
    }
}

/// Location of the persisted state.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct StoreConfig {
    /// Service state (pool, NCs, joined networks)
    pub state_path: PathBuf,
    /// Endpoint state, only used with `ManageEndpointState`
    pub endpoint_state_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("/var/lib/azure-network/azure-cns.json"),
            endpoint_state_path: PathBuf::from("/var/run/azure-cns/azure-endpoints.json"),
        }
    }
}

/// Host agent connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct NmAgentConfig {
    pub base_url: String,
    /// Per-call deadline in milliseconds
    pub timeout_ms: u64,
}

impl Default for NmAgentConfig {
    fn default() -> Self {
        Self {
            base_url: cns_nmagent::ClientConfig::default().base_url,
            timeout_ms: cns_nmagent::DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl NmAgentConfig {
    pub fn client_config(&self) -> cns_nmagent::ClientConfig {
        let timeout = Duration::from_millis(self.timeout_ms);
        cns_nmagent::ClientConfig {
            base_url: self.base_url.clone(),
            timeout,
            connect_timeout: timeout,
        }
    }
}

/// Background loop intervals.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ReconcilerConfig {
    pub host_version_interval_secs: u64,
    pub snapshot_interval_secs: u64,
    pub home_az_refresh_secs: u64,
    /// Deadline of the host version list fetched during a cluster sync
    pub sync_host_version_timeout_ms: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            host_version_interval_secs: 1,
            snapshot_interval_secs: 60,
            home_az_refresh_secs: 15 * 60,
            sync_host_version_timeout_ms: 500,
        }
    }
}

impl ReconcilerConfig {
    pub fn host_version_interval(&self) -> Duration {
        Duration::from_secs(self.host_version_interval_secs.max(1))
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs.max(1))
    }

    pub fn home_az_refresh(&self) -> Duration {
        Duration::from_secs(self.home_az_refresh_secs.max(1))
    }

    pub fn sync_host_version_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_host_version_timeout_ms)
    }
}

/// CNI conflist written once every NC is programmed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ConflistConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub network_name: String,
    pub plugin_type: String,
}

impl Default for ConflistConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from("/etc/cni/net.d/15-azure-swift.conflist"),
            network_name: "azure".to_string(),
            plugin_type: "azure-vnet".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
