//! Network container registry.
//!
//! Saving an NC validates its goal state, applies the secondary IP delta to
//! the pool (CRD orchestrators) or indexes its pod context (others), and
//! records it with its programmed host version. All functions operate on a
//! locked [`RestServiceState`]; persistence is the caller's job.

use cns_types::{
    CreateNetworkContainerRequest, HostIPInfo, IPSubnet, KubernetesPodInfo, PodIpInfo, ResponseCode,
};
use ipnetwork::IpNetwork;
use std::net::IpAddr;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::ipam::{IPConfigurationStatus, IpamError, PodInfo};
use crate::state::{parse_version, ContainerStatus, RestServiceState, UNOBSERVED_HOST_VERSION};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Network container id not specified")]
    NetworkContainerNotSpecified,

    #[error("Unsupported network container type: {0}")]
    UnsupportedNetworkContainerType(String),

    #[error("Unsupported orchestrator type: {0:?}")]
    UnsupportedOrchestratorType(String),

    #[error("Invalid primary IP configuration: {0}")]
    InvalidPrimaryIPConfig(String),

    #[error("Invalid secondary IP configuration: {0}")]
    InvalidSecondaryIPConfig(String),

    #[error("Unsupported NC version: {0}")]
    UnsupportedNCVersion(String),

    #[error("Primary IP configuration of {0} cannot change")]
    PrimaryCANotSame(String),

    #[error("Orchestrator context is empty")]
    EmptyOrchestratorContext,

    #[error("Unsupported orchestrator context: {0}")]
    UnsupportedOrchestratorContext(String),

    #[error("Unknown container id for {0}")]
    UnknownContainerID(String),

    #[error("Host version of {nc_id} cannot move from {current} to {requested}")]
    HostVersionRegression {
        nc_id: String,
        current: i64,
        requested: i64,
    },

    #[error(transparent)]
    Ipam(#[from] IpamError),
}

impl RegistryError {
    pub fn code(&self) -> ResponseCode {
        match self {
            RegistryError::NetworkContainerNotSpecified => ResponseCode::NetworkContainerNotSpecified,
            RegistryError::UnsupportedNetworkContainerType(_) => {
                ResponseCode::UnsupportedNetworkContainerType
            }
            RegistryError::UnsupportedOrchestratorType(_) => ResponseCode::UnsupportedOrchestratorType,
            RegistryError::InvalidPrimaryIPConfig(_) => ResponseCode::InvalidPrimaryIPConfig,
            RegistryError::InvalidSecondaryIPConfig(_) => ResponseCode::InvalidSecondaryIPConfig,
            RegistryError::UnsupportedNCVersion(_) => ResponseCode::UnsupportedNCVersion,
            RegistryError::PrimaryCANotSame(_) => ResponseCode::PrimaryCANotSame,
            RegistryError::EmptyOrchestratorContext => ResponseCode::EmptyOrchestratorContext,
            RegistryError::UnsupportedOrchestratorContext(_) => {
                ResponseCode::UnsupportedOrchestratorContext
            }
            RegistryError::UnknownContainerID(_) => ResponseCode::UnknownContainerID,
            RegistryError::HostVersionRegression { .. } => ResponseCode::UnexpectedError,
            RegistryError::Ipam(e) => e.code(),
        }
    }
}

/// What is known about the host version of an NC being created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostVersionHint {
    /// Nothing observed: the NC starts at `-1` and its new IPs are gated.
    Unobserved,
    /// The host reported this version during a cluster sync.
    Observed(i64),
    /// The host could not be asked: new IPs start Available.
    Ungated,
}

/// Validate a goal state without touching any state.
pub fn validate_nc_request(req: &CreateNetworkContainerRequest, crd: bool) -> Result<i64, RegistryError> {
    if req.network_container_id.is_empty() {
        return Err(RegistryError::NetworkContainerNotSpecified);
    }
    if !req.network_container_type.is_supported() {
        return Err(RegistryError::UnsupportedNetworkContainerType(
            req.network_container_type.to_string(),
        ));
    }

    let version = parse_version(&req.version)
        .map_err(|_| RegistryError::UnsupportedNCVersion(req.version.clone()))?;

    let subnet = &req.ip_configuration.ip_subnet;
    if crd || !subnet.ip_address.is_empty() {
        let addr: IpAddr = subnet.ip_address.parse().map_err(|_| {
            RegistryError::InvalidPrimaryIPConfig(format!("invalid IP address {:?}", subnet.ip_address))
        })?;
        IpNetwork::new(addr, subnet.prefix_length).map_err(|e| {
            RegistryError::InvalidPrimaryIPConfig(format!(
                "{}/{}: {}",
                subnet.ip_address, subnet.prefix_length, e
            ))
        })?;
    }

    for (id, ip) in &req.secondary_ip_configs {
        if ip.ip_address.is_empty() {
            return Err(RegistryError::InvalidSecondaryIPConfig(format!(
                "secondary IP {} has no address",
                id
            )));
        }
        if ip.ip_address.parse::<IpAddr>().is_err() {
            return Err(RegistryError::InvalidSecondaryIPConfig(format!(
                "secondary IP {} has invalid address {:?}",
                id, ip.ip_address
            )));
        }
        if ip.nc_version < 0 {
            return Err(RegistryError::UnsupportedNCVersion(format!(
                "secondary IP {} has negative version {}",
                id, ip.nc_version
            )));
        }
    }

    Ok(version)
}

impl RestServiceState {
    /// Save (create or update) an NC's goal state.
    ///
    /// Either the whole save applies or nothing changes.
    pub fn save_nc_goal_state(
        &mut self,
        mut req: CreateNetworkContainerRequest,
        hint: HostVersionHint,
    ) -> Result<(), RegistryError> {
        if !self.orchestrator_type.is_supported() {
            return Err(RegistryError::UnsupportedOrchestratorType(
                self.orchestrator_type.to_string(),
            ));
        }
        let crd = self.orchestrator_type.is_crd();
        let version = validate_nc_request(&req, crd)?;
        let nc_id = req.network_container_id.clone();

        let existing = self.containers.get(&nc_id);
        if let Some(existing) = existing {
            if existing.request.ip_configuration != req.ip_configuration {
                return Err(RegistryError::PrimaryCANotSame(nc_id));
            }
        }

        let host_version = match existing {
            Some(existing) if existing.host_version() > version => version.to_string(),
            Some(existing) => existing.host_version.clone(),
            None => match hint {
                HostVersionHint::Observed(v) => v.min(version).to_string(),
                HostVersionHint::Unobserved | HostVersionHint::Ungated => {
                    UNOBSERVED_HOST_VERSION.to_string()
                }
            },
        };
        let vfp_update_complete = existing
            .map(|e| e.vfp_update_complete && e.request.version == req.version)
            .unwrap_or(false);
        let vm_version = existing.map(|e| e.vm_version.clone()).unwrap_or_default();

        if crd {
            let host = parse_version(&host_version).unwrap_or(-1);
            let gate = hint != HostVersionHint::Ungated;
            self.pool
                .apply_goal_state(&nc_id, &req.secondary_ip_configs, host, gate)?;
        } else if self.orchestrator_type.indexes_pod_context() && !req.orchestrator_context.is_null() {
            let pod = KubernetesPodInfo::from_orchestrator_context(&req.orchestrator_context)
                .map_err(|e| RegistryError::UnsupportedOrchestratorContext(e.to_string()))?;
            self.context_index
                .insert(pod.orchestrator_context_key(), nc_id.clone());
        }

        req.authorization_token.clear();
        self.containers.insert(
            nc_id.clone(),
            ContainerStatus {
                id: nc_id.clone(),
                vm_version,
                host_version: host_version.clone(),
                request: req,
                vfp_update_complete,
            },
        );
        self.initialized = true;

        let counts = self.pool.counts();
        info!(
            nc_id = %nc_id,
            version,
            host_version = %host_version,
            available = counts.available,
            assigned = counts.assigned,
            pending_programming = counts.pending_programming,
            pending_release = counts.pending_release,
            "Network container saved"
        );
        Ok(())
    }

    /// Remove an NC, its pod context entries and (CRD) its unassigned IPs.
    ///
    /// Returns whether the NC existed.
    pub fn delete_nc(&mut self, nc_id: &str) -> bool {
        let existed = self.containers.remove(nc_id).is_some();
        self.context_index.retain(|_, id| id != nc_id);

        if self.orchestrator_type.is_crd() {
            let kept = self.pool.remove_nc_ips(nc_id);
            if !kept.is_empty() {
                warn!(nc_id = %nc_id, ips = ?kept, "Assigned IPs outlive their deleted network container");
            }
        }

        if existed {
            info!(nc_id = %nc_id, "Network container deleted");
        }
        existed
    }

    /// Return the IP held by `pod` to the pool.
    ///
    /// An IP whose NC was deleted while it was Assigned leaves the pool
    /// instead of becoming Available.
    pub fn release_pod_ip(&mut self, pod: &PodInfo) -> Result<Option<IPConfigurationStatus>, IpamError> {
        let released = self.pool.release_ip_config(pod)?;
        if let Some(status) = &released {
            if !self.containers.contains_key(&status.nc_id) {
                self.pool.remove_ip(&status.id)?;
                info!(ip_id = %status.id, nc_id = %status.nc_id, "Dropped IP of deleted network container");
            }
        }
        Ok(released)
    }

    /// Drop unassigned IPs whose NC no longer exists. Returns how many left.
    pub fn drop_orphaned_ips(&mut self) -> usize {
        let containers = &self.containers;
        let removed = self.pool.remove_unowned_ips(|nc_id| containers.contains_key(nc_id));
        if !removed.is_empty() {
            warn!(ips = ?removed, "Dropped IPs of deleted network containers");
        }
        removed.len()
    }

    /// Resolve the NC owning the pod named in `context`.
    pub fn nc_by_orchestrator_context(
        &self,
        context: &serde_json::Value,
    ) -> Result<&ContainerStatus, RegistryError> {
        if context.is_null() {
            return Err(RegistryError::EmptyOrchestratorContext);
        }
        let pod = KubernetesPodInfo::from_orchestrator_context(context)
            .map_err(|e| RegistryError::UnsupportedOrchestratorContext(e.to_string()))?;
        let key = pod.orchestrator_context_key();

        self.context_index
            .get(&key)
            .and_then(|nc_id| self.containers.get(nc_id))
            .ok_or(RegistryError::UnknownContainerID(key))
    }

    /// Everything the CNI plugin needs for an assigned IP: the IP with its NC
    /// prefix, the NC primary configuration and the host interface.
    pub fn pod_ip_info(
        &self,
        status: &IPConfigurationStatus,
        host: &HostIPInfo,
    ) -> Result<PodIpInfo, RegistryError> {
        let nc = self
            .containers
            .get(&status.nc_id)
            .ok_or_else(|| RegistryError::UnknownContainerID(status.nc_id.clone()))?;
        let primary = &nc.request.ip_configuration;

        Ok(PodIpInfo {
            pod_ip_config: IPSubnet::new(status.ip_address.clone(), primary.ip_subnet.prefix_length),
            network_container_primary_ip_config: primary.clone(),
            host_primary_ip_info: host.clone(),
        })
    }

    /// NCs whose host version lags their goal-state version.
    pub fn outdated_ncs(&self) -> Vec<(String, i64, i64)> {
        self.containers
            .values()
            .filter(|nc| nc.is_outdated())
            .map(|nc| (nc.id.clone(), nc.version(), nc.host_version()))
            .collect()
    }

    /// Record that the host has programmed `nc_id` at `host_version`.
    ///
    /// A lower value than the one stored is rejected. The stored value never
    /// exceeds the goal-state version. PendingProgramming IPs that the new
    /// version covers become Available in the same call. Returns whether the
    /// stored host version changed.
    pub fn advance_host_version(&mut self, nc_id: &str, host_version: i64) -> Result<bool, RegistryError> {
        let nc = self
            .containers
            .get_mut(nc_id)
            .ok_or_else(|| RegistryError::UnknownContainerID(nc_id.to_string()))?;

        let current = nc.host_version();
        if host_version < current {
            error!(nc_id = %nc_id, current, reported = host_version, "Host version regressed, ignoring");
            return Err(RegistryError::HostVersionRegression {
                nc_id: nc_id.to_string(),
                current,
                requested: host_version,
            });
        }

        let new_version = host_version.min(nc.version());
        if new_version == current {
            return Ok(false);
        }
        nc.host_version = new_version.to_string();

        let promoted = self.pool.mark_ips_as_available_untransacted(nc_id, new_version);
        info!(nc_id = %nc_id, from = current, to = new_version, promoted, "Host version advanced");
        Ok(true)
    }
}
