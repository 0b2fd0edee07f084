//! In-memory service state and its persisted form.

use chrono::{DateTime, Utc};
use cns_types::{CreateNetworkContainerRequest, OrchestratorType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::endpoint::EndpointMap;
use crate::ipam::{IPConfigurationStatus, IpamPool, StateTransitionMiddleware};

/// Host version of an NC never observed on the host.
pub const UNOBSERVED_HOST_VERSION: &str = "-1";

/// A saved NC together with what the host has programmed for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerStatus {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "VMVersion", default)]
    pub vm_version: String,
    #[serde(rename = "HostVersion")]
    pub host_version: String,
    #[serde(rename = "CreateNetworkContainerRequest")]
    pub request: CreateNetworkContainerRequest,
    #[serde(rename = "VfpUpdateComplete", default)]
    pub vfp_update_complete: bool,
}

impl ContainerStatus {
    /// Goal-state version. Saved NCs always carry a parseable version.
    pub fn version(&self) -> i64 {
        parse_version(&self.request.version).unwrap_or(0)
    }

    /// Programmed version, `-1` when never observed.
    pub fn host_version(&self) -> i64 {
        parse_version(&self.host_version).unwrap_or(-1)
    }

    pub fn is_outdated(&self) -> bool {
        self.host_version() < self.version()
    }
}

/// Parse a version carried as a string. An empty string is version 0.
pub fn parse_version(version: &str) -> Result<i64, std::num::ParseIntError> {
    let version = version.trim();
    if version.is_empty() {
        return Ok(0);
    }
    version.parse()
}

/// Serialized shape of the service state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(rename = "OrchestratorType", default)]
    pub orchestrator_type: OrchestratorType,
    #[serde(rename = "NodeID", default)]
    pub node_id: String,
    #[serde(rename = "DncPartitionKey", default)]
    pub dnc_partition_key: String,
    #[serde(rename = "Initialized", default)]
    pub initialized: bool,
    #[serde(rename = "ContainerStatus", default)]
    pub container_status: BTreeMap<String, ContainerStatus>,
    #[serde(rename = "ContainerIDByOrchestratorContext", default)]
    pub container_id_by_orchestrator_context: BTreeMap<String, String>,
    #[serde(rename = "PodIPConfigState", default)]
    pub pod_ip_config_state: BTreeMap<String, IPConfigurationStatus>,
    #[serde(rename = "PodIPIDByPodInterfaceKey", default)]
    pub pod_ip_id_by_pod_interface_key: BTreeMap<String, String>,
    #[serde(rename = "JoinedNetworks", default)]
    pub joined_networks: BTreeSet<String>,
    #[serde(rename = "TimeStamp", default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Everything guarded by the service lock.
pub struct RestServiceState {
    pub orchestrator_type: OrchestratorType,
    pub node_id: String,
    pub dnc_partition_key: String,
    pub initialized: bool,
    /// NC id to saved NC.
    pub containers: BTreeMap<String, ContainerStatus>,
    /// Pod name + namespace to NC id.
    pub context_index: BTreeMap<String, String>,
    pub pool: IpamPool,
    pub joined_networks: BTreeSet<String>,
    /// Persisted in the endpoint store, not with the rest.
    pub endpoints: EndpointMap,
    /// Process-wide timestamp stamped into every write.
    pub timestamp: DateTime<Utc>,
}

impl RestServiceState {
    pub fn new(timestamp: DateTime<Utc>, middleware: Arc<dyn StateTransitionMiddleware>) -> Self {
        Self {
            orchestrator_type: OrchestratorType::default(),
            node_id: String::new(),
            dnc_partition_key: String::new(),
            initialized: false,
            containers: BTreeMap::new(),
            context_index: BTreeMap::new(),
            pool: IpamPool::new(middleware),
            joined_networks: BTreeSet::new(),
            endpoints: EndpointMap::new(),
            timestamp,
        }
    }

    pub fn from_persisted(
        persisted: PersistedState,
        timestamp: DateTime<Utc>,
        middleware: Arc<dyn StateTransitionMiddleware>,
    ) -> Self {
        let pool = IpamPool::from_parts(
            persisted.pod_ip_config_state,
            &persisted.pod_ip_id_by_pod_interface_key,
            middleware,
        );
        Self {
            orchestrator_type: persisted.orchestrator_type,
            node_id: persisted.node_id,
            dnc_partition_key: persisted.dnc_partition_key,
            initialized: persisted.initialized,
            containers: persisted.container_status,
            context_index: persisted.container_id_by_orchestrator_context,
            pool,
            joined_networks: persisted.joined_networks,
            endpoints: EndpointMap::new(),
            timestamp,
        }
    }

    pub fn to_persisted(&self) -> PersistedState {
        PersistedState {
            orchestrator_type: self.orchestrator_type.clone(),
            node_id: self.node_id.clone(),
            dnc_partition_key: self.dnc_partition_key.clone(),
            initialized: self.initialized,
            container_status: self.containers.clone(),
            container_id_by_orchestrator_context: self.context_index.clone(),
            pod_ip_config_state: self.pool.configs().clone(),
            pod_ip_id_by_pod_interface_key: self.pool.pod_index().clone(),
            joined_networks: self.joined_networks.clone(),
            timestamp: Some(self.timestamp),
        }
    }
}
