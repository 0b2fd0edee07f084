//! SNAT rules letting pods reach the host DNS and metadata endpoints.
//!
//! Pods on an NC subnet talk to the wireserver DNS (udp/tcp 53) through the
//! NC primary IP and to IMDS (tcp 80) through the host primary IP. Rules live
//! in their own nat chain jumped to from POSTROUTING.

use async_trait::async_trait;
use cns_types::{CreateNetworkContainerRequest, ResponseCode};
use ipnetwork::IpNetwork;
use std::net::IpAddr;
use std::sync::Mutex;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, instrument};

pub const SNAT_CHAIN: &str = "SWIFT-POSTROUTING";
pub const AZURE_DNS: &str = "168.63.129.16";
pub const AZURE_IMDS: &str = "169.254.169.254";
const DNS_PORT: u16 = 53;
const HTTP_PORT: u16 = 80;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SnatError {
    #[error("Invalid NC address: {0}")]
    InvalidAddress(String),

    #[error("iptables {args} failed: {stderr}")]
    Command { args: String, stderr: String },
}

impl SnatError {
    pub fn code(&self) -> ResponseCode {
        match self {
            SnatError::InvalidAddress(_) => ResponseCode::InvalidPrimaryIPConfig,
            SnatError::Command { .. } => ResponseCode::FailedToRunIPTableCmd,
        }
    }
}

/// Programs host NAT rules for an NC.
#[async_trait]
pub trait SnatProgrammer: Send + Sync {
    async fn program(&self, req: &CreateNetworkContainerRequest, host_primary_ip: &str) -> Result<(), SnatError>;
}

/// Rule specs (arguments after `-t nat -A <chain>`) needed by `req`.
pub fn snat_rules(req: &CreateNetworkContainerRequest, host_primary_ip: &str) -> Result<Vec<Vec<String>>, SnatError> {
    let subnet = &req.ip_configuration.ip_subnet;
    let nc_primary: IpAddr = subnet
        .ip_address
        .parse()
        .map_err(|_| SnatError::InvalidAddress(subnet.ip_address.clone()))?;

    let mut rules = Vec::new();
    let mut seen = Vec::new();
    for ip in req.secondary_ip_configs.values() {
        let addr: IpAddr = ip
            .ip_address
            .parse()
            .map_err(|_| SnatError::InvalidAddress(ip.ip_address.clone()))?;
        let pod_subnet = IpNetwork::new(addr, subnet.prefix_length)
            .map_err(|e| SnatError::InvalidAddress(e.to_string()))?;
        let pod_subnet = IpNetwork::new(pod_subnet.network(), subnet.prefix_length)
            .map_err(|e| SnatError::InvalidAddress(e.to_string()))?
            .to_string();
        if seen.contains(&pod_subnet) {
            continue;
        }
        seen.push(pod_subnet.clone());

        for proto in ["udp", "tcp"] {
            rules.push(rule(&pod_subnet, AZURE_DNS, proto, DNS_PORT, &nc_primary.to_string()));
        }
        if !host_primary_ip.is_empty() {
            rules.push(rule(&pod_subnet, AZURE_IMDS, "tcp", HTTP_PORT, host_primary_ip));
        }
    }
    Ok(rules)
}

fn rule(source: &str, dest: &str, proto: &str, port: u16, to: &str) -> Vec<String> {
    [
        "-m", "addrtype", "!", "--dst-type", "local", "-s", source, "-d", dest, "-p", proto,
        "--dport", &port.to_string(), "-j", "SNAT", "--to", to,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// `iptables` backed programmer.
pub struct IptablesSnat {
    binary: String,
}

impl Default for IptablesSnat {
    fn default() -> Self {
        Self {
            binary: "iptables".to_string(),
        }
    }
}

impl IptablesSnat {
    pub fn new() -> Self {
        Self::default()
    }

    async fn run(&self, args: &[String]) -> Result<bool, SnatError> {
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| SnatError::Command {
                args: args.join(" "),
                stderr: e.to_string(),
            })?;
        Ok(output.status.success())
    }

    async fn run_checked(&self, args: &[String]) -> Result<(), SnatError> {
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| SnatError::Command {
                args: args.join(" "),
                stderr: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(SnatError::Command {
                args: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    /// Append `rule` to `chain` unless an identical rule exists.
    async fn ensure_rule(&self, chain: &str, rule: &[String]) -> Result<(), SnatError> {
        let mut check = nat_args("-C", chain);
        check.extend_from_slice(rule);
        if self.run(&check).await? {
            return Ok(());
        }
        let mut append = nat_args("-A", chain);
        append.extend_from_slice(rule);
        self.run_checked(&append).await
    }
}

fn nat_args(op: &str, chain: &str) -> Vec<String> {
    vec!["-w".to_string(), "-t".to_string(), "nat".to_string(), op.to_string(), chain.to_string()]
}

#[async_trait]
impl SnatProgrammer for IptablesSnat {
    #[instrument(skip(self, req), fields(nc_id = %req.network_container_id))]
    async fn program(&self, req: &CreateNetworkContainerRequest, host_primary_ip: &str) -> Result<(), SnatError> {
        let rules = snat_rules(req, host_primary_ip)?;
        if rules.is_empty() {
            return Ok(());
        }

        if !self.run(&nat_args("-L", SNAT_CHAIN)).await? {
            self.run_checked(&nat_args("-N", SNAT_CHAIN)).await?;
        }
        self.ensure_rule("POSTROUTING", &["-j".to_string(), SNAT_CHAIN.to_string()])
            .await?;

        for rule in &rules {
            self.ensure_rule(SNAT_CHAIN, rule).await?;
        }
        info!(rules = rules.len(), "SNAT rules programmed");
        Ok(())
    }
}

/// Programmer that only records the NCs it was asked to program.
#[derive(Default)]
pub struct RecordingSnat {
    programmed: Mutex<Vec<String>>,
}

impl RecordingSnat {
    pub fn programmed(&self) -> Vec<String> {
        self.programmed.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SnatProgrammer for RecordingSnat {
    async fn program(&self, req: &CreateNetworkContainerRequest, host_primary_ip: &str) -> Result<(), SnatError> {
        snat_rules(req, host_primary_ip)?;
        debug!(nc_id = %req.network_container_id, "Recording SNAT request");
        if let Ok(mut programmed) = self.programmed.lock() {
            programmed.push(req.network_container_id.clone());
        }
        Ok(())
    }
}
