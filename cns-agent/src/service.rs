//! CNS service implementation.
//!
//! [`RestService`] owns the service state lock, the stores, the outbound
//! clients and the metrics. Every handler takes a decoded request and returns
//! a response whose envelope carries the outcome; nothing here fails at the
//! transport level.

use chrono::Utc;
use cns_nmagent::{nc_version_url, NmAgentClient};
use cns_types::{
    ChannelMode, ConfigureContainerNetworkingRequest, CreateNetworkContainerRequest,
    CreateNetworkContainerResponse, DeleteNetworkContainerRequest, DeleteNetworkContainerResponse,
    GetAllNetworkContainersResponse, GetHomeAzResponse, GetNetworkContainerRequest,
    GetNetworkContainerResponse, HostIPInfo, IPConfigRequest, IPConfigResponse, IPConfigState,
    KubernetesPodInfo, NmAgentSupportedApisRequest, NmAgentSupportedApisResponse,
    NumOfCPUCoresResponse, OrchestratorType, PodIpInfo, PostNetworkContainersRequest,
    PostNetworkContainersResponse, Response, ResponseCode, SetOrchestratorTypeRequest,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::dnc::DncClient;
use crate::endpoint;
use crate::home_az::HomeAzMonitor;
use crate::ipam::{IPConfigurationStatus, PodInfo};
use crate::metrics::Metrics;
use crate::named_lock::NamedLocks;
use crate::netplugin::{NetPlugin, PluginContext, RecordingNetPlugin};
use crate::pending::PodPendingSet;
use crate::reboot;
use crate::registry::HostVersionHint;
use crate::snat::{RecordingSnat, SnatProgrammer};
use crate::state::{PersistedState, RestServiceState};
use crate::store::{
    KeyValueStore, KeyValueStoreExt, MemoryStore, StoreError, ENDPOINTS_KEY, SERVICE_STATE_KEY,
};

/// Interface name recorded for a pod when the request names none.
const DEFAULT_IFNAME: &str = "eth0";

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Failed to recover state: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to register metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Runtime options of the service.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub channel_mode: ChannelMode,
    pub manage_endpoint_state: bool,
    pub program_snat_iptables: bool,
    pub private_endpoint: String,
    pub infrastructure_network_id: String,
    pub node_id: String,
    pub dnc_api_version: String,
    pub nmagent_base_url: String,
    pub host_primary_ip_info: HostIPInfo,
    /// Deadline of the host version list fetched during a cluster sync.
    pub sync_host_version_timeout: Duration,
    pub home_az_refresh: Duration,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ServiceOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            channel_mode: config.channel_mode,
            manage_endpoint_state: config.manage_endpoint_state,
            program_snat_iptables: config.program_snat_iptables,
            private_endpoint: config.private_endpoint.clone(),
            infrastructure_network_id: config.infrastructure_network_id.clone(),
            node_id: config.node_id(),
            dnc_api_version: config.dnc_api_version.clone(),
            nmagent_base_url: config.nmagent.base_url.clone(),
            host_primary_ip_info: config.host_primary_interface.clone(),
            sync_host_version_timeout: config.reconcilers.sync_host_version_timeout(),
            home_az_refresh: config.reconcilers.home_az_refresh(),
        }
    }
}

/// External collaborators of the service.
pub struct ServiceDeps {
    pub store: Arc<dyn KeyValueStore>,
    pub endpoint_store: Arc<dyn KeyValueStore>,
    pub nmagent: Arc<dyn NmAgentClient>,
    pub dnc: Arc<dyn DncClient>,
    pub net_plugin: Arc<dyn NetPlugin>,
    pub snat: Arc<dyn SnatProgrammer>,
}

impl ServiceDeps {
    /// In-memory stores with recording plugin and SNAT fakes.
    pub fn in_memory(nmagent: Arc<dyn NmAgentClient>, dnc: Arc<dyn DncClient>) -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            endpoint_store: Arc::new(MemoryStore::new()),
            nmagent,
            dnc,
            net_plugin: Arc::new(RecordingNetPlugin::default()),
            snat: Arc::new(RecordingSnat::default()),
        }
    }
}

// ============================================================================
// Debug response types
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetIPAddressStatusResponse {
    #[serde(rename = "IPConfigurationStatus", default)]
    pub ip_configuration_status: Vec<IPConfigurationStatus>,
    #[serde(rename = "Response")]
    pub response: Response,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetPodContextResponse {
    /// Pod key to IP UUID.
    #[serde(rename = "PodContext", default)]
    pub pod_context: BTreeMap<String, String>,
    #[serde(rename = "Response")]
    pub response: Response,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpRestServiceData {
    #[serde(rename = "PodIPIDByPodInterfaceKey", default)]
    pub pod_ip_id_by_pod_interface_key: BTreeMap<String, String>,
    #[serde(rename = "PodIPConfigState", default)]
    pub pod_ip_config_state: BTreeMap<String, IPConfigurationStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetHTTPServiceDataResponse {
    #[serde(rename = "HttpRestServiceData", default)]
    pub http_rest_service_data: HttpRestServiceData,
    #[serde(rename = "Response")]
    pub response: Response,
}

/// Envelope for a failed operation, logging it on the way out.
pub(crate) fn failure(code: ResponseCode, message: impl Into<String>) -> Response {
    let message = message.into();
    warn!(return_code = %code, message = %message, "Request failed");
    Response::new(code, message)
}

/// The CNS service.
pub struct RestService {
    pub(crate) state: RwLock<RestServiceState>,
    store: Arc<dyn KeyValueStore>,
    endpoint_store: Arc<dyn KeyValueStore>,
    pub(crate) nmagent: Arc<dyn NmAgentClient>,
    pub(crate) dnc: Arc<dyn DncClient>,
    net_plugin: Arc<dyn NetPlugin>,
    snat: Arc<dyn SnatProgrammer>,
    pub(crate) metrics: Metrics,
    pub(crate) locks: NamedLocks,
    /// NC id to its legacy version URL.
    nc_version_urls: DashMap<String, String>,
    pending: PodPendingSet,
    home_az: Arc<HomeAzMonitor>,
    pub(crate) options: ServiceOptions,
}

impl RestService {
    /// Build the service and recover persisted state.
    pub fn new(options: ServiceOptions, deps: ServiceDeps) -> Result<Self, ServiceError> {
        Self::with_boot_time(options, deps, reboot::host_boot_time())
    }

    /// Like [`RestService::new`] with an explicit host boot time.
    pub fn with_boot_time(
        options: ServiceOptions,
        deps: ServiceDeps,
        boot_time: Option<chrono::DateTime<Utc>>,
    ) -> Result<Self, ServiceError> {
        let metrics = Metrics::new()?;
        let state = recover_state(&deps, &options, &metrics, boot_time)?;
        metrics.set_pool_counts(&state.pool.counts());

        let home_az = Arc::new(HomeAzMonitor::new(deps.nmagent.clone(), options.home_az_refresh));

        Ok(Self {
            state: RwLock::new(state),
            store: deps.store,
            endpoint_store: deps.endpoint_store,
            nmagent: deps.nmagent,
            dnc: deps.dnc,
            net_plugin: deps.net_plugin,
            snat: deps.snat,
            metrics,
            locks: NamedLocks::new(),
            nc_version_urls: DashMap::new(),
            pending: PodPendingSet::default(),
            home_az,
            options,
        })
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn home_az_monitor(&self) -> Arc<HomeAzMonitor> {
        self.home_az.clone()
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    /// Snapshot of what would be persisted right now.
    pub async fn persisted_state(&self) -> PersistedState {
        self.state.read().await.to_persisted()
    }

    /// Write the service state. The caller holds the write guard.
    pub(crate) fn persist(&self, state: &RestServiceState) -> Result<(), StoreError> {
        self.metrics.set_pool_counts(&state.pool.counts());
        let result = self.store.write_typed(SERVICE_STATE_KEY, &state.to_persisted());
        if let Err(ref e) = result {
            error!(error = %e, "Failed to persist service state");
        }
        result
    }

    /// Persist where a failed write only costs redoing the work after restart.
    pub(crate) fn persist_or_warn(&self, state: &RestServiceState) {
        if let Err(e) = self.persist(state) {
            warn!(error = %e, "Continuing with unpersisted service state");
        }
    }

    fn persist_endpoints(&self, state: &RestServiceState) {
        if let Err(e) = endpoint::persist(self.endpoint_store.as_ref(), &state.endpoints) {
            error!(error = %e, "Failed to persist endpoint state");
        }
    }

    // ========================================================================
    // IPAM
    // ========================================================================

    #[instrument(skip(self, req), fields(infra_container_id = %req.infra_container_id))]
    pub async fn request_ip_config(&self, req: IPConfigRequest) -> IPConfigResponse {
        let pod = match PodInfo::from_request(&req) {
            Ok(pod) => pod,
            Err(e) => {
                return IPConfigResponse {
                    response: failure(e.code(), e.to_string()),
                    ..Default::default()
                }
            }
        };
        let pod_key = pod.key();
        self.pending.push(&pod_key);

        let result = self.assign_ip_config(&pod, &req).await;
        match result {
            Ok((status, pod_ip_info)) => {
                let waited = self.pending.pop(&pod_key);
                self.metrics.ip_assignment_latency_seconds.observe(waited.as_secs_f64());
                info!(
                    pod = %pod_key,
                    ip = %status.ip_address,
                    id = %status.id,
                    nc_id = %status.nc_id,
                    "IP assigned"
                );
                IPConfigResponse {
                    pod_ip_info,
                    response: Response::success(),
                }
            }
            Err(response) => {
                self.pending.pop(&pod_key);
                IPConfigResponse {
                    response,
                    ..Default::default()
                }
            }
        }
    }

    /// Allocate under the state lock. On error nothing the pod can observe
    /// has changed.
    async fn assign_ip_config(
        &self,
        pod: &PodInfo,
        req: &IPConfigRequest,
    ) -> Result<(IPConfigurationStatus, PodIpInfo), Response> {
        let desired = Some(req.desired_ip_address.as_str()).filter(|ip| !ip.is_empty());
        let mut state = self.state.write().await;

        let dropped = state.drop_orphaned_ips();
        let held = matches!(state.pool.existing_ip_config(pod), Ok(Some(_)));

        let status = match state.pool.request_ip_config(pod, desired) {
            Ok(status) => status,
            Err(e) => {
                if dropped > 0 {
                    self.persist_or_warn(&state);
                }
                return Err(failure(e.code(), e.to_string()));
            }
        };

        let pod_ip_info = match state.pod_ip_info(&status, &self.options.host_primary_ip_info) {
            Ok(info) => info,
            Err(e) => {
                if !held {
                    if let Err(undo) = state.release_pod_ip(pod) {
                        error!(error = %undo, "Failed to undo assignment");
                    }
                }
                if dropped > 0 || !held {
                    self.persist_or_warn(&state);
                }
                return Err(failure(e.code(), e.to_string()));
            }
        };

        if self.options.manage_endpoint_state {
            let ifname = if req.ifname.is_empty() { DEFAULT_IFNAME } else { req.ifname.as_str() };
            if endpoint::record_assignment(&mut state.endpoints, pod, ifname, &status.ip_address) {
                self.persist_endpoints(&state);
            }
        }

        if let Err(e) = self.persist(&state) {
            return Err(failure(ResponseCode::UnexpectedError, e.to_string()));
        }
        Ok((status, pod_ip_info))
    }

    #[instrument(skip(self, req), fields(infra_container_id = %req.infra_container_id))]
    pub async fn release_ip_config(&self, req: IPConfigRequest) -> Response {
        let pod = match PodInfo::from_request(&req) {
            Ok(pod) => pod,
            Err(e) => return failure(e.code(), e.to_string()),
        };
        self.pending.pop(&pod.key());

        let mut state = self.state.write().await;
        let released = match state.release_pod_ip(&pod) {
            Ok(released) => released,
            Err(e) => return failure(e.code(), e.to_string()),
        };

        if self.options.manage_endpoint_state
            && endpoint::remove_endpoint(&mut state.endpoints, &pod.infra_container_id)
        {
            self.persist_endpoints(&state);
        }

        match released {
            Some(status) => {
                if let Err(e) = self.persist(&state) {
                    return failure(ResponseCode::UnexpectedError, e.to_string());
                }
                info!(pod = %pod.key(), ip = %status.ip_address, "IP released");
            }
            None => debug!(pod = %pod.key(), "Release for pod without IP"),
        }
        Response::success()
    }

    /// Move `n` Available IPs to PendingRelease for the pool monitor.
    pub async fn mark_ip_as_pending_release(&self, n: usize) -> Result<Vec<IPConfigurationStatus>, StoreError> {
        let mut state = self.state.write().await;
        let marked = state.pool.mark_ip_as_pending_release(n);
        self.persist(&state)?;
        info!(requested = n, marked = marked.len(), "IPs marked pending release");
        Ok(marked)
    }

    /// Move the named IPs to PendingRelease for the pool monitor.
    pub async fn mark_existing_ips_as_pending_release(&self, ids: &[String]) -> Response {
        let mut state = self.state.write().await;
        let result = state.pool.mark_existing_ips_as_pending_release(ids);
        if let Err(e) = self.persist(&state) {
            return failure(ResponseCode::UnexpectedError, e.to_string());
        }
        match result {
            Ok(()) => Response::success(),
            Err(e) => failure(e.code(), e.to_string()),
        }
    }

    // ========================================================================
    // Orchestrator identity
    // ========================================================================

    #[instrument(skip(self))]
    pub async fn set_orchestrator_type(&self, req: SetOrchestratorTypeRequest) -> Response {
        let mut state = self.state.write().await;

        let registered = &state.node_id;
        if !registered.is_empty() && *registered != req.node_id && !state.containers.is_empty() {
            return failure(
                ResponseCode::InvalidRequest,
                format!("Invalid request since this node has already been registered as {}", registered),
            );
        }
        if !req.orchestrator_type.is_supported() {
            return failure(
                ResponseCode::UnsupportedOrchestratorType,
                format!("Invalid orchestrator type {}", req.orchestrator_type),
            );
        }

        state.orchestrator_type = req.orchestrator_type.clone();
        state.node_id = req.node_id.clone();
        state.dnc_partition_key = req.dnc_partition_key.clone();
        if let Err(e) = self.persist(&state) {
            return failure(ResponseCode::UnexpectedError, e.to_string());
        }

        info!(orchestrator = %req.orchestrator_type, node_id = %req.node_id, "Orchestrator type set");
        Response::success()
    }

    // ========================================================================
    // Network containers
    // ========================================================================

    #[instrument(skip(self, req), fields(nc_id = %req.network_container_id, version = %req.version))]
    pub async fn create_or_update_network_container(
        &self,
        req: CreateNetworkContainerRequest,
    ) -> CreateNetworkContainerResponse {
        let response = self.save_network_container(req, HostVersionHint::Unobserved).await;
        CreateNetworkContainerResponse { response }
    }

    /// Save one NC, record its version URL and program its SNAT rules.
    pub(crate) async fn save_network_container(
        &self,
        req: CreateNetworkContainerRequest,
        hint: HostVersionHint,
    ) -> Response {
        let nc_id = req.network_container_id.clone();
        let token = req.authorization_token.clone();
        let primary_interface = req.primary_interface_identifier.clone();
        let snat_request = self.options.program_snat_iptables.then(|| req.clone());

        {
            let mut state = self.state.write().await;
            if let Err(e) = state.save_nc_goal_state(req, hint) {
                return failure(e.code(), e.to_string());
            }
            if let Err(e) = self.persist(&state) {
                return failure(ResponseCode::UnexpectedError, e.to_string());
            }
        }

        if !token.is_empty() {
            let url = nc_version_url(&self.options.nmagent_base_url, &primary_interface, &nc_id, &token);
            self.nc_version_urls.insert(nc_id.clone(), url);
        }

        if let Some(req) = snat_request {
            if let Err(e) = self
                .snat
                .program(&req, &self.options.host_primary_ip_info.primary_ip)
                .await
            {
                return failure(e.code(), e.to_string());
            }
        }

        Response::success()
    }

    #[instrument(skip(self))]
    pub async fn delete_network_container(
        &self,
        req: DeleteNetworkContainerRequest,
    ) -> DeleteNetworkContainerResponse {
        if req.network_container_id.is_empty() {
            return DeleteNetworkContainerResponse {
                response: failure(
                    ResponseCode::NetworkContainerNotSpecified,
                    "network container id not specified",
                ),
            };
        }

        let mut state = self.state.write().await;
        if state.delete_nc(&req.network_container_id) {
            if let Err(e) = self.persist(&state) {
                return DeleteNetworkContainerResponse {
                    response: failure(ResponseCode::UnexpectedError, e.to_string()),
                };
            }
        }
        drop(state);

        self.nc_version_urls.remove(&req.network_container_id);
        DeleteNetworkContainerResponse {
            response: Response::success(),
        }
    }

    #[instrument(skip(self, req))]
    pub async fn get_network_container_by_orchestrator_context(
        &self,
        req: GetNetworkContainerRequest,
    ) -> GetNetworkContainerResponse {
        let context = req.orchestrator_context;

        let lookup = self.state.read().await.nc_by_orchestrator_context(&context).map(|nc| nc.clone());
        let nc = match lookup {
            Ok(nc) => nc,
            Err(e) if self.options.channel_mode == ChannelMode::Managed
                && e.code() == ResponseCode::UnknownContainerID =>
            {
                // The state lock is not held across the sync.
                if let Err(response) = self.sync_node_status().await {
                    return GetNetworkContainerResponse::error(response);
                }
                match self.state.read().await.nc_by_orchestrator_context(&context) {
                    Ok(nc) => nc.clone(),
                    Err(e) => {
                        return GetNetworkContainerResponse::error(failure(
                            ResponseCode::NotFound,
                            format!("network container not found after sync: {}", e),
                        ))
                    }
                }
            }
            Err(e) => return GetNetworkContainerResponse::error(failure(e.code(), e.to_string())),
        };

        match self.check_vfp_programmed(&nc.id).await {
            VfpCheck::Complete => {
                GetNetworkContainerResponse::from_request(&nc.request, Response::success())
            }
            VfpCheck::Pending(message) => GetNetworkContainerResponse::error(Response::new(
                ResponseCode::NetworkContainerVfpProgramPending,
                message,
            )),
            VfpCheck::Skipped(message) => GetNetworkContainerResponse::from_request(
                &nc.request,
                Response::new(ResponseCode::NetworkContainerVfpProgramCheckSkipped, message),
            ),
        }
    }

    /// Ask the host whether `nc_id` is programmed at its saved version.
    ///
    /// A positive answer is recorded in `VfpUpdateComplete` and persisted.
    pub(crate) async fn check_vfp_programmed(&self, nc_id: &str) -> VfpCheck {
        let version = {
            let state = self.state.read().await;
            match state.containers.get(nc_id) {
                Some(nc) if nc.vfp_update_complete => return VfpCheck::Complete,
                Some(nc) => nc.version(),
                None => return VfpCheck::Skipped(format!("network container {} is gone", nc_id)),
            }
        };

        let host_version = match self.nc_version_urls.get(nc_id).map(|u| u.value().clone()) {
            Some(url) => self.nmagent.nc_version(&url).await.map(|nc| nc.version),
            None => self
                .nmagent
                .nc_version_list()
                .await
                .map(|list| list.version_of(nc_id).unwrap_or_default().to_string()),
        };
        let host_version = match host_version {
            Ok(v) if v.is_empty() => {
                return VfpCheck::Pending(format!("host has not programmed {} yet", nc_id))
            }
            Ok(v) => v,
            Err(e) => return VfpCheck::Skipped(format!("failed to query host version: {}", e)),
        };
        let host_version: i64 = match host_version.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                return VfpCheck::Skipped(format!("host reported invalid version {:?}", host_version))
            }
        };

        if host_version < version {
            return VfpCheck::Pending(format!(
                "host programmed {} at version {}, waiting for {}",
                nc_id, host_version, version
            ));
        }

        let mut state = self.state.write().await;
        if let Some(nc) = state.containers.get_mut(nc_id) {
            if nc.version() == version && !nc.vfp_update_complete {
                nc.vfp_update_complete = true;
                self.persist_or_warn(&state);
                info!(nc_id = %nc_id, version, "VFP programming complete");
            }
        }
        VfpCheck::Complete
    }

    #[instrument(skip(self))]
    pub async fn get_all_network_containers(&self) -> GetAllNetworkContainersResponse {
        let state = self.state.read().await;
        GetAllNetworkContainersResponse {
            network_containers: state
                .containers
                .values()
                .map(|nc| GetNetworkContainerResponse::from_request(&nc.request, Response::success()))
                .collect(),
            response: Response::success(),
        }
    }

    /// Save every NC that is new or whose version changed.
    #[instrument(skip(self, req), fields(count = req.create_network_container_requests.len()))]
    pub async fn post_network_containers(&self, req: PostNetworkContainersRequest) -> PostNetworkContainersResponse {
        let mut first_error: Option<Response> = None;
        let mut saved = 0;

        for nc in req.create_network_container_requests {
            let unchanged = {
                let state = self.state.read().await;
                state
                    .containers
                    .get(&nc.network_container_id)
                    .map(|existing| existing.request.version == nc.version)
                    .unwrap_or(false)
            };
            if unchanged {
                continue;
            }

            let response = self.save_network_container(nc, HostVersionHint::Unobserved).await;
            if response.is_success() {
                saved += 1;
            } else if first_error.is_none() {
                first_error = Some(response);
            }
        }

        debug!(saved, "Batch of network containers processed");
        PostNetworkContainersResponse {
            response: first_error.unwrap_or_else(Response::success),
        }
    }

    // ========================================================================
    // Node
    // ========================================================================

    #[instrument(skip(self))]
    pub async fn nmagent_supported_apis(&self, req: NmAgentSupportedApisRequest) -> NmAgentSupportedApisResponse {
        if !req.get_nm_agent_supported_apis_url.is_empty() {
            debug!(url = %req.get_nm_agent_supported_apis_url, "Ignoring caller URL, using configured host agent");
        }
        match self.nmagent.supported_apis().await {
            Ok(supported_apis) => NmAgentSupportedApisResponse {
                response: Response::success(),
                supported_apis,
            },
            Err(e) => NmAgentSupportedApisResponse {
                response: failure(ResponseCode::NmAgentSupportedApisError, e.to_string()),
                supported_apis: Vec::new(),
            },
        }
    }

    pub async fn get_home_az(&self) -> GetHomeAzResponse {
        self.home_az.get().await
    }

    pub fn number_of_cpu_cores(&self) -> NumOfCPUCoresResponse {
        NumOfCPUCoresResponse {
            response: Response::success(),
            num_of_cpu_cores: num_cpus::get(),
        }
    }

    // ========================================================================
    // Attach / detach
    // ========================================================================

    pub async fn attach_container_to_network(&self, req: ConfigureContainerNetworkingRequest) -> Response {
        self.attach_or_detach(req, true).await
    }

    pub async fn detach_container_from_network(&self, req: ConfigureContainerNetworkingRequest) -> Response {
        self.attach_or_detach(req, false).await
    }

    #[instrument(skip(self), fields(nc_id = %req.network_container_id, container_id = %req.container_id))]
    async fn attach_or_detach(&self, req: ConfigureContainerNetworkingRequest, attach: bool) -> Response {
        let nc_id = &req.network_container_id;
        if nc_id.is_empty() {
            return failure(ResponseCode::NetworkContainerNotSpecified, "network container id not specified");
        }

        if attach && self.options.channel_mode == ChannelMode::Managed {
            let known = self.state.read().await.containers.contains_key(nc_id);
            if !known {
                if let Err(response) = self.sync_node_status().await {
                    return response;
                }
            }
            if let VfpCheck::Pending(message) = self.check_vfp_programmed(nc_id).await {
                return Response::new(ResponseCode::NetworkContainerVfpProgramPending, message);
            }
        }

        let (orchestrator, context) = {
            let state = self.state.read().await;
            match state.containers.get(nc_id) {
                Some(nc) => (state.orchestrator_type.clone(), nc.request.orchestrator_context.clone()),
                None => {
                    return failure(
                        ResponseCode::NotFound,
                        format!("Network container {} does not exist", nc_id),
                    )
                }
            }
        };

        if orchestrator != OrchestratorType::Batch {
            return failure(
                ResponseCode::UnsupportedOrchestratorType,
                format!("Invalid orchestrator type {}", orchestrator),
            );
        }

        let pod = match KubernetesPodInfo::from_orchestrator_context(&context) {
            Ok(pod) => pod,
            Err(e) => return failure(ResponseCode::UnsupportedOrchestratorContext, e.to_string()),
        };
        let ctx = PluginContext {
            container_id: req.container_id.clone(),
            netns: req.container_id.clone(),
            ifname: DEFAULT_IFNAME.to_string(),
            pod_name: pod.pod_name,
            pod_namespace: pod.pod_namespace,
        };

        let result = if attach {
            self.net_plugin.add(&ctx).await
        } else {
            self.net_plugin.delete(&ctx).await
        };
        match result {
            Ok(()) => Response::success(),
            Err(e) => failure(ResponseCode::UnexpectedError, e.to_string()),
        }
    }

    // ========================================================================
    // Debug
    // ========================================================================

    pub async fn ip_addresses(&self, filter: &[IPConfigState]) -> GetIPAddressStatusResponse {
        let states = if filter.is_empty() { &IPConfigState::ALL[..] } else { filter };
        GetIPAddressStatusResponse {
            ip_configuration_status: self.state.read().await.pool.filter_by_state(states),
            response: Response::success(),
        }
    }

    pub async fn pod_context(&self) -> GetPodContextResponse {
        GetPodContextResponse {
            pod_context: self.state.read().await.pool.pod_index().clone(),
            response: Response::success(),
        }
    }

    pub async fn rest_data(&self) -> GetHTTPServiceDataResponse {
        let state = self.state.read().await;
        GetHTTPServiceDataResponse {
            http_rest_service_data: HttpRestServiceData {
                pod_ip_id_by_pod_interface_key: state.pool.pod_index().clone(),
                pod_ip_config_state: state.pool.configs().clone(),
            },
            response: Response::success(),
        }
    }
}

/// Outcome of asking the host whether an NC is programmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum VfpCheck {
    Complete,
    Pending(String),
    Skipped(String),
}

/// Load the persisted state, discarding it when it cannot be decoded.
fn recover_state(
    deps: &ServiceDeps,
    options: &ServiceOptions,
    metrics: &Metrics,
    boot_time: Option<chrono::DateTime<Utc>>,
) -> Result<RestServiceState, StoreError> {
    let timestamp = Utc::now();
    let middleware = Arc::new(metrics.transition_counter());

    let mut state = match deps.store.read_typed::<PersistedState>(SERVICE_STATE_KEY) {
        Ok(persisted) => {
            let last_write = reboot::last_write_time(persisted.timestamp, deps.store.as_ref());
            let mut state = RestServiceState::from_persisted(persisted, timestamp, middleware);
            if reboot::rebooted_since(last_write, boot_time) {
                info!(
                    joined_networks = state.joined_networks.len(),
                    "Host rebooted since last write, clearing joined networks and endpoints"
                );
                state.joined_networks.clear();
                deps.endpoint_store.remove()?;
            }
            info!(
                ncs = state.containers.len(),
                ips = state.pool.len(),
                orchestrator = %state.orchestrator_type,
                "Service state recovered"
            );
            state
        }
        Err(StoreError::NotFound(_)) => {
            info!("No persisted service state, starting empty");
            RestServiceState::new(timestamp, middleware)
        }
        Err(StoreError::Encoding(e)) => {
            warn!(error = %e, "Persisted service state is corrupt, removing it");
            deps.store.remove()?;
            RestServiceState::new(timestamp, middleware)
        }
        Err(e) => return Err(e),
    };

    if options.manage_endpoint_state {
        state.endpoints = match endpoint::load(deps.endpoint_store.as_ref()) {
            Ok(endpoints) => endpoints,
            Err(StoreError::Encoding(e)) => {
                warn!(error = %e, key = ENDPOINTS_KEY, "Endpoint state is corrupt, removing it");
                deps.endpoint_store.remove()?;
                endpoint::EndpointMap::new()
            }
            Err(e) => return Err(e),
        };
    }

    Ok(state)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dnc::{sync_node_network_containers_url, MockDncClient};
    use cns_nmagent::MockNmAgent;
    use cns_types::{IPConfiguration, IPSubnet, NodeInfoResponse, SecondaryIPConfig};
    use serde_json::json;

    pub(crate) fn options() -> ServiceOptions {
        ServiceOptions {
            node_id: "node1".to_string(),
            private_endpoint: "http://dnc".to_string(),
            infrastructure_network_id: "infra".to_string(),
            nmagent_base_url: "http://nma".to_string(),
            ..ServiceOptions::default()
        }
    }

    pub(crate) fn test_service() -> (RestService, Arc<MockNmAgent>) {
        let nma = Arc::new(MockNmAgent::new());
        let deps = ServiceDeps::in_memory(nma.clone(), Arc::new(MockDncClient::new()));
        let service = RestService::with_boot_time(options(), deps, None).unwrap();
        (service, nma)
    }

    pub(crate) fn nc_request(id: &str, version: &str, ips: &[(&str, &str, i64)]) -> CreateNetworkContainerRequest {
        CreateNetworkContainerRequest {
            network_container_id: id.to_string(),
            version: version.to_string(),
            ip_configuration: IPConfiguration {
                ip_subnet: IPSubnet::new("10.0.0.0", 24),
                dns_servers: vec!["168.63.129.16".to_string()],
                gateway_ip_address: "10.0.0.1".to_string(),
            },
            secondary_ip_configs: ips
                .iter()
                .map(|(uuid, ip, v)| {
                    (
                        uuid.to_string(),
                        SecondaryIPConfig {
                            ip_address: ip.to_string(),
                            nc_version: *v,
                        },
                    )
                })
                .collect(),
            ..Default::default()
        }
    }

    pub(crate) fn ip_request(name: &str, desired: &str) -> IPConfigRequest {
        IPConfigRequest {
            desired_ip_address: desired.to_string(),
            infra_container_id: format!("{}-infra", name),
            orchestrator_context: KubernetesPodInfo::new(name, "ns1").to_orchestrator_context(),
            ..Default::default()
        }
    }

    async fn set_orchestrator(service: &RestService, orchestrator: OrchestratorType) {
        let resp = service
            .set_orchestrator_type(SetOrchestratorTypeRequest {
                orchestrator_type: orchestrator,
                node_id: "node1".to_string(),
                ..Default::default()
            })
            .await;
        assert!(resp.is_success());
    }

    #[tokio::test]
    async fn test_request_and_release() {
        let (service, _) = test_service();
        set_orchestrator(&service, OrchestratorType::KubernetesCRD).await;
        let nc = nc_request("nc1", "0", &[("uuid-A", "10.0.0.4", 0)]);
        service.save_network_container(nc, HostVersionHint::Observed(0)).await;

        let resp = service.request_ip_config(ip_request("p1", "")).await;
        assert!(resp.response.is_success());
        assert_eq!(resp.pod_ip_info.pod_ip_config, IPSubnet::new("10.0.0.4", 24));
        assert_eq!(resp.pod_ip_info.network_container_primary_ip_config.gateway_ip_address, "10.0.0.1");

        let persisted = service.persisted_state().await;
        assert_eq!(persisted.pod_ip_config_state["uuid-A"].state(), IPConfigState::Assigned);

        assert!(service.release_ip_config(ip_request("p1", "")).await.is_success());
        assert!(service.release_ip_config(ip_request("p1", "")).await.is_success());
        let persisted = service.persisted_state().await;
        assert_eq!(persisted.pod_ip_config_state["uuid-A"].state(), IPConfigState::Available);
    }

    #[tokio::test]
    async fn test_request_without_context() {
        let (service, _) = test_service();
        let resp = service.request_ip_config(IPConfigRequest::default()).await;
        assert_eq!(resp.response.return_code, ResponseCode::EmptyOrchestratorContext);
    }

    #[tokio::test]
    async fn test_ip_of_deleted_nc_is_never_reassigned() {
        let (service, _) = test_service();
        set_orchestrator(&service, OrchestratorType::KubernetesCRD).await;
        service
            .save_network_container(nc_request("nc1", "0", &[("uuid-A", "10.0.0.4", 0)]), HostVersionHint::Observed(0))
            .await;
        assert!(service.request_ip_config(ip_request("p1", "")).await.response.is_success());

        let resp = service
            .delete_network_container(DeleteNetworkContainerRequest {
                network_container_id: "nc1".to_string(),
            })
            .await;
        assert!(resp.response.is_success());
        let persisted = service.persisted_state().await;
        assert_eq!(persisted.pod_ip_config_state["uuid-A"].state(), IPConfigState::Assigned);

        // The holder keeps its IP but cannot be served without the NC.
        let again = service.request_ip_config(ip_request("p1", "")).await;
        assert_eq!(again.response.return_code, ResponseCode::UnknownContainerID);
        assert_eq!(
            service.persisted_state().await.pod_ip_id_by_pod_interface_key.len(),
            1
        );

        assert!(service.release_ip_config(ip_request("p1", "")).await.is_success());
        let resp = service.request_ip_config(ip_request("p2", "")).await;
        assert_eq!(resp.response.return_code, ResponseCode::FailedToAllocateIPConfig);
        let resp = service.request_ip_config(ip_request("p3", "10.0.0.4")).await;
        assert!(!resp.response.is_success());

        let persisted = service.persisted_state().await;
        assert!(persisted.pod_ip_config_state.is_empty());
        assert!(persisted.pod_ip_id_by_pod_interface_key.is_empty());
    }

    #[tokio::test]
    async fn test_orphaned_available_ip_is_dropped_on_request() {
        let (service, _) = test_service();
        set_orchestrator(&service, OrchestratorType::KubernetesCRD).await;
        service
            .save_network_container(nc_request("nc1", "0", &[("uuid-A", "10.0.0.4", 0)]), HostVersionHint::Observed(0))
            .await;
        service.state.write().await.pool.add_ip(IPConfigurationStatus::new(
            "uuid-0",
            "gone",
            "10.9.0.4",
            0,
            IPConfigState::Available,
        ));

        let resp = service.request_ip_config(ip_request("p1", "")).await;
        assert!(resp.response.is_success());
        assert_eq!(resp.pod_ip_info.pod_ip_config.ip_address, "10.0.0.4");
        assert!(!service.persisted_state().await.pod_ip_config_state.contains_key("uuid-0"));
    }

    #[tokio::test]
    async fn test_failed_requests_do_not_stay_pending() {
        let (service, _) = test_service();
        set_orchestrator(&service, OrchestratorType::KubernetesCRD).await;

        for i in 0..crate::pending::DEFAULT_CAPACITY + 50 {
            let resp = service.request_ip_config(ip_request(&format!("p{}", i), "")).await;
            assert_eq!(resp.response.return_code, ResponseCode::FailedToAllocateIPConfig);
        }
        assert!(service.pending.is_empty());

        service
            .save_network_container(nc_request("nc1", "0", &[("uuid-A", "10.0.0.4", 0)]), HostVersionHint::Observed(0))
            .await;
        assert!(service.request_ip_config(ip_request("late", "")).await.response.is_success());
        assert!(service.pending.is_empty());
    }

    #[tokio::test]
    async fn test_vfp_complete_survives_store_failure() {
        let nma = Arc::new(MockNmAgent::new());
        let store = Arc::new(MemoryStore::new());
        let deps = ServiceDeps {
            store: store.clone(),
            ..ServiceDeps::in_memory(nma.clone(), Arc::new(MockDncClient::new()))
        };
        let service = RestService::with_boot_time(options(), deps, None).unwrap();
        set_orchestrator(&service, OrchestratorType::KubernetesCRD).await;
        service
            .save_network_container(nc_request("nc1", "2", &[]), HostVersionHint::Observed(2))
            .await;
        nma.set_nc_version("nc1", "2");

        store.fail_writes(true);
        assert!(matches!(service.check_vfp_programmed("nc1").await, VfpCheck::Complete));
        assert!(service.state.read().await.containers["nc1"].vfp_update_complete);
    }

    #[tokio::test]
    async fn test_set_orchestrator_type() {
        let (service, _) = test_service();
        let resp = service
            .set_orchestrator_type(SetOrchestratorTypeRequest {
                orchestrator_type: "Mesos".to_string().into(),
                node_id: "node1".to_string(),
                ..Default::default()
            })
            .await;
        assert_eq!(resp.return_code, ResponseCode::UnsupportedOrchestratorType);

        set_orchestrator(&service, OrchestratorType::KubernetesCRD).await;
        service
            .create_or_update_network_container(nc_request("nc1", "1", &[]))
            .await;

        let resp = service
            .set_orchestrator_type(SetOrchestratorTypeRequest {
                orchestrator_type: OrchestratorType::KubernetesCRD,
                node_id: "node2".to_string(),
                ..Default::default()
            })
            .await;
        assert_eq!(resp.return_code, ResponseCode::InvalidRequest);
        assert_eq!(service.persisted_state().await.node_id, "node1");
    }

    #[tokio::test]
    async fn test_delete_requires_id() {
        let (service, _) = test_service();
        let resp = service
            .delete_network_container(DeleteNetworkContainerRequest::default())
            .await;
        assert_eq!(resp.response.return_code, ResponseCode::NetworkContainerNotSpecified);

        let resp = service
            .delete_network_container(DeleteNetworkContainerRequest {
                network_container_id: "missing".to_string(),
            })
            .await;
        assert!(resp.response.is_success());
    }

    #[tokio::test]
    async fn test_get_by_context_waits_for_host() {
        let (service, nma) = test_service();
        set_orchestrator(&service, OrchestratorType::Kubernetes).await;

        let context = KubernetesPodInfo::new("p1", "ns1").to_orchestrator_context();
        let mut nc = nc_request("nc1", "2", &[]);
        nc.orchestrator_context = context.clone();
        let resp = service.create_or_update_network_container(nc).await;
        assert!(resp.response.is_success());

        let get = GetNetworkContainerRequest {
            orchestrator_context: context,
            ..Default::default()
        };

        nma.set_nc_version("nc1", "1");
        let resp = service.get_network_container_by_orchestrator_context(get.clone()).await;
        assert_eq!(resp.response.return_code, ResponseCode::NetworkContainerVfpProgramPending);

        nma.set_nc_version("nc1", "2");
        let resp = service.get_network_container_by_orchestrator_context(get.clone()).await;
        assert!(resp.response.is_success());
        assert_eq!(resp.network_container_id, "nc1");
        assert!(service.persisted_state().await.container_status["nc1"].vfp_update_complete);

        nma.fail_with(Some(cns_nmagent::NmAgentError::InternalServerError("down".to_string())));
        let resp = service.get_network_container_by_orchestrator_context(get).await;
        assert!(resp.response.is_success());
    }

    #[tokio::test]
    async fn test_vfp_check_skipped_when_host_unreachable() {
        let (service, nma) = test_service();
        set_orchestrator(&service, OrchestratorType::Kubernetes).await;
        let context = KubernetesPodInfo::new("p1", "ns1").to_orchestrator_context();
        let mut nc = nc_request("nc1", "2", &[]);
        nc.orchestrator_context = context.clone();
        service.create_or_update_network_container(nc).await;

        nma.fail_with(Some(cns_nmagent::NmAgentError::InternalServerError("down".to_string())));
        let resp = service
            .get_network_container_by_orchestrator_context(GetNetworkContainerRequest {
                orchestrator_context: context,
                ..Default::default()
            })
            .await;
        assert_eq!(resp.response.return_code, ResponseCode::NetworkContainerVfpProgramCheckSkipped);
        assert_eq!(resp.network_container_id, "nc1");
    }

    #[tokio::test]
    async fn test_token_selects_version_url() {
        let (service, nma) = test_service();
        set_orchestrator(&service, OrchestratorType::Kubernetes).await;
        let context = KubernetesPodInfo::new("p1", "ns1").to_orchestrator_context();
        let mut nc = nc_request("nc1", "1", &[]);
        nc.orchestrator_context = context.clone();
        nc.authorization_token = "token".to_string();
        nc.primary_interface_identifier = "10.1.0.4".to_string();
        service.create_or_update_network_container(nc).await;

        nma.set_nc_version("nc1", "1");
        let resp = service
            .get_network_container_by_orchestrator_context(GetNetworkContainerRequest {
                orchestrator_context: context,
                ..Default::default()
            })
            .await;
        assert!(resp.response.is_success());
        assert_eq!(nma.version_list_calls(), 0);
    }

    #[tokio::test]
    async fn test_managed_miss_syncs_from_cluster() {
        let nma = Arc::new(MockNmAgent::new());
        let dnc = Arc::new(MockDncClient::new());
        let options = ServiceOptions {
            channel_mode: ChannelMode::Managed,
            ..options()
        };
        let url = sync_node_network_containers_url("http://dnc", "infra", "node1", &options.dnc_api_version);
        let context = KubernetesPodInfo::new("p1", "ns1").to_orchestrator_context();
        let mut nc = nc_request("nc1", "1", &[]);
        nc.orchestrator_context = context.clone();
        dnc.set_node_info(&url, NodeInfoResponse { network_containers: vec![nc] });
        nma.set_nc_version("nc1", "1");

        let service = RestService::with_boot_time(
            options,
            ServiceDeps::in_memory(nma.clone(), dnc.clone()),
            None,
        )
        .unwrap();
        set_orchestrator(&service, OrchestratorType::Kubernetes).await;

        let resp = service
            .get_network_container_by_orchestrator_context(GetNetworkContainerRequest {
                orchestrator_context: context,
                ..Default::default()
            })
            .await;
        assert!(resp.response.is_success());
        assert_eq!(dnc.calls(), vec![url]);
        assert_eq!(service.persisted_state().await.container_status["nc1"].host_version, "1");

        let resp = service
            .get_network_container_by_orchestrator_context(GetNetworkContainerRequest {
                orchestrator_context: KubernetesPodInfo::new("p2", "ns1").to_orchestrator_context(),
                ..Default::default()
            })
            .await;
        assert_eq!(resp.response.return_code, ResponseCode::NotFound);
    }

    #[tokio::test]
    async fn test_attach_requires_batch() {
        let nma = Arc::new(MockNmAgent::new());
        let plugin = Arc::new(RecordingNetPlugin::default());
        let deps = ServiceDeps {
            net_plugin: plugin.clone(),
            ..ServiceDeps::in_memory(nma, Arc::new(MockDncClient::new()))
        };
        let service = RestService::with_boot_time(options(), deps, None).unwrap();

        let req = ConfigureContainerNetworkingRequest {
            container_id: "c1".to_string(),
            network_container_id: "nc1".to_string(),
        };
        assert_eq!(
            service.attach_container_to_network(req.clone()).await.return_code,
            ResponseCode::NotFound
        );

        set_orchestrator(&service, OrchestratorType::Kubernetes).await;
        let mut nc = nc_request("nc1", "1", &[]);
        nc.orchestrator_context = KubernetesPodInfo::new("p1", "ns1").to_orchestrator_context();
        service.create_or_update_network_container(nc).await;
        assert_eq!(
            service.attach_container_to_network(req.clone()).await.return_code,
            ResponseCode::UnsupportedOrchestratorType
        );

        set_orchestrator(&service, OrchestratorType::Batch).await;
        assert!(service.attach_container_to_network(req.clone()).await.is_success());
        assert!(service.detach_container_from_network(req).await.is_success());
        assert_eq!(
            plugin.calls(),
            vec![("ADD".to_string(), "c1".to_string()), ("DEL".to_string(), "c1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_snat_programmed_on_create() {
        let nma = Arc::new(MockNmAgent::new());
        let snat = Arc::new(RecordingSnat::default());
        let deps = ServiceDeps {
            snat: snat.clone(),
            ..ServiceDeps::in_memory(nma, Arc::new(MockDncClient::new()))
        };
        let options = ServiceOptions {
            program_snat_iptables: true,
            ..options()
        };
        let service = RestService::with_boot_time(options, deps, None).unwrap();
        set_orchestrator(&service, OrchestratorType::KubernetesCRD).await;

        let resp = service
            .create_or_update_network_container(nc_request("nc1", "1", &[]))
            .await;
        assert!(resp.response.is_success());
        assert_eq!(snat.programmed(), vec!["nc1".to_string()]);
    }

    #[tokio::test]
    async fn test_endpoint_state_follows_assignment() {
        let nma = Arc::new(MockNmAgent::new());
        let deps = ServiceDeps::in_memory(nma, Arc::new(MockDncClient::new()));
        let endpoint_store = deps.endpoint_store.clone();
        let options = ServiceOptions {
            manage_endpoint_state: true,
            ..options()
        };
        let service = RestService::with_boot_time(options, deps, None).unwrap();
        set_orchestrator(&service, OrchestratorType::KubernetesCRD).await;
        service
            .save_network_container(nc_request("nc1", "0", &[("a", "10.0.0.4", 0)]), HostVersionHint::Observed(0))
            .await;

        assert!(service.request_ip_config(ip_request("p1", "")).await.response.is_success());
        let endpoints = endpoint::load(endpoint_store.as_ref()).unwrap();
        assert_eq!(endpoints["p1-infra"].pod_name, "p1");

        assert!(service.release_ip_config(ip_request("p1", "")).await.is_success());
        assert!(endpoint::load(endpoint_store.as_ref()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_state_starts_fresh() {
        let store = Arc::new(MemoryStore::new());
        store.write(SERVICE_STATE_KEY, json!({"ContainerStatus": "garbage"})).unwrap();
        let deps = ServiceDeps {
            store: store.clone(),
            ..ServiceDeps::in_memory(Arc::new(MockNmAgent::new()), Arc::new(MockDncClient::new()))
        };

        let service = RestService::with_boot_time(options(), deps, None).unwrap();
        assert!(service.persisted_state().await.container_status.is_empty());
        assert!(!store.exists());
    }

    #[tokio::test]
    async fn test_reboot_clears_joined_networks() {
        let store = Arc::new(MemoryStore::new());
        let endpoint_store = Arc::new(MemoryStore::new());
        let written = Utc::now() - chrono::Duration::hours(1);
        let persisted = PersistedState {
            orchestrator_type: OrchestratorType::KubernetesCRD,
            joined_networks: ["vnet1".to_string()].into_iter().collect(),
            timestamp: Some(written),
            ..Default::default()
        };
        store.write_typed(SERVICE_STATE_KEY, &persisted).unwrap();
        endpoint_store.write(ENDPOINTS_KEY, json!({})).unwrap();

        let deps = ServiceDeps {
            store: store.clone(),
            endpoint_store: endpoint_store.clone(),
            ..ServiceDeps::in_memory(Arc::new(MockNmAgent::new()), Arc::new(MockDncClient::new()))
        };
        let service = RestService::with_boot_time(options(), deps, Some(Utc::now())).unwrap();

        let state = service.persisted_state().await;
        assert!(state.joined_networks.is_empty());
        assert_eq!(state.orchestrator_type, OrchestratorType::KubernetesCRD);
        assert!(!endpoint_store.exists());
    }

    #[tokio::test]
    async fn test_post_skips_unchanged() {
        let (service, _) = test_service();
        set_orchestrator(&service, OrchestratorType::KubernetesCRD).await;
        let req = PostNetworkContainersRequest {
            create_network_container_requests: vec![nc_request("nc1", "1", &[]), nc_request("nc2", "1", &[])],
        };
        assert!(service.post_network_containers(req.clone()).await.response.is_success());
        assert!(service.post_network_containers(req).await.response.is_success());

        let all = service.get_all_network_containers().await;
        assert_eq!(all.network_containers.len(), 2);
    }

    #[tokio::test]
    async fn test_debug_views() {
        let (service, _) = test_service();
        set_orchestrator(&service, OrchestratorType::KubernetesCRD).await;
        service
            .save_network_container(
                nc_request("nc1", "1", &[("a", "10.0.0.4", 0), ("b", "10.0.0.5", 1)]),
                HostVersionHint::Observed(0),
            )
            .await;
        service.request_ip_config(ip_request("p1", "10.0.0.4")).await;

        let all = service.ip_addresses(&[]).await;
        assert_eq!(all.ip_configuration_status.len(), 2);
        let pending = service.ip_addresses(&[IPConfigState::PendingProgramming]).await;
        assert_eq!(pending.ip_configuration_status.len(), 1);
        assert_eq!(pending.ip_configuration_status[0].id, "b");

        let pods = service.pod_context().await;
        assert_eq!(pods.pod_context.get("p1:ns1"), Some(&"a".to_string()));
        let data = service.rest_data().await;
        assert_eq!(data.http_rest_service_data.pod_ip_config_state.len(), 2);
    }
}
