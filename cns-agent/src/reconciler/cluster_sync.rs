//! Pull the node's authoritative NC list from the cluster controller.

use cns_nmagent::NcVersionListResponse;
use cns_types::{CreateNetworkContainerRequest, Response};
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::dnc::sync_node_network_containers_url;
use crate::registry::HostVersionHint;
use crate::service::{failure, RestService};
use crate::state::parse_version;

const RECONCILER_NAME: &str = "cluster_sync";

impl RestService {
    /// Replay the cluster controller's goal state for this node.
    ///
    /// NCs missing locally or at another version are saved, local NCs the
    /// controller no longer lists are deleted. The host version list is
    /// fetched alongside under a short deadline; without it new IPs are not
    /// gated on a host version.
    #[instrument(skip(self))]
    pub async fn sync_node_status(&self) -> Result<(), Response> {
        let start = Instant::now();
        let result = self.sync_node_status_inner().await;
        self.metrics
            .observe_reconciler(RECONCILER_NAME, result.is_ok(), start.elapsed());
        result
    }

    async fn sync_node_status_inner(&self) -> Result<(), Response> {
        let node_id = {
            let state = self.state.read().await;
            if state.node_id.is_empty() {
                self.options.node_id.clone()
            } else {
                state.node_id.clone()
            }
        };
        let url = sync_node_network_containers_url(
            &self.options.private_endpoint,
            &self.options.infrastructure_network_id,
            &node_id,
            &self.options.dnc_api_version,
        );

        let (node_info, host_versions) = tokio::join!(
            self.dnc.get_node_info(&url),
            tokio::time::timeout(
                self.options.sync_host_version_timeout,
                self.nmagent.nc_version_list()
            ),
        );

        let node_info = node_info.map_err(|e| {
            failure(
                e.code(),
                format!("Failed to sync node network containers: {}", e),
            )
        })?;
        let host_versions = match host_versions {
            Ok(Ok(list)) => Some(list),
            Ok(Err(e)) => {
                warn!(error = %e, "Host versions unavailable, new IPs will not be gated");
                None
            }
            Err(_) => {
                warn!("Host version list timed out, new IPs will not be gated");
                None
            }
        };

        let (adds, deletes) = {
            let state = self.state.read().await;
            let listed: BTreeSet<&str> = node_info
                .network_containers
                .iter()
                .map(|nc| nc.network_container_id.as_str())
                .collect();

            let adds: Vec<CreateNetworkContainerRequest> = node_info
                .network_containers
                .iter()
                .filter(|nc| {
                    state
                        .containers
                        .get(&nc.network_container_id)
                        .map(|existing| existing.request.version != nc.version)
                        .unwrap_or(true)
                })
                .cloned()
                .collect();
            let deletes: Vec<String> = state
                .containers
                .keys()
                .filter(|id| !listed.contains(id.as_str()))
                .cloned()
                .collect();
            (adds, deletes)
        };

        let (added, deleted) = (adds.len(), deletes.len());
        for nc in adds {
            let hint = host_version_hint(host_versions.as_ref(), &nc.network_container_id);
            let nc_id = nc.network_container_id.clone();
            let response = self.save_network_container(nc, hint).await;
            if !response.is_success() {
                warn!(nc_id = %nc_id, return_code = %response.return_code, "Skipping network container from cluster");
            }
        }

        if !deletes.is_empty() {
            let mut state = self.state.write().await;
            for nc_id in &deletes {
                state.delete_nc(nc_id);
            }
            // The goal state is re-pulled on the next miss.
            self.persist_or_warn(&state);
        }

        info!(node_id = %node_id, added, deleted, "Node status synced");
        Ok(())
    }
}

/// How far the host has programmed `nc_id`, as far as the sync can tell.
fn host_version_hint(list: Option<&NcVersionListResponse>, nc_id: &str) -> HostVersionHint {
    let Some(list) = list else {
        return HostVersionHint::Ungated;
    };
    match list.version_of(nc_id).filter(|v| !v.trim().is_empty()) {
        Some(v) => parse_version(v)
            .map(HostVersionHint::Observed)
            .unwrap_or(HostVersionHint::Unobserved),
        None => HostVersionHint::Unobserved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dnc::MockDncClient;
    use crate::service::tests::{nc_request, options};
    use crate::service::{ServiceDeps, ServiceOptions};
    use cns_nmagent::{MockNmAgent, NcVersion, NmAgentError};
    use cns_types::{
        ChannelMode, IPConfigState, NodeInfoResponse, OrchestratorType, ResponseCode,
        SetOrchestratorTypeRequest,
    };
    use std::sync::Arc;

    async fn managed_service() -> (RestService, Arc<MockNmAgent>, Arc<MockDncClient>, String) {
        let nma = Arc::new(MockNmAgent::new());
        let dnc = Arc::new(MockDncClient::new());
        let options = ServiceOptions {
            channel_mode: ChannelMode::Managed,
            ..options()
        };
        let url = sync_node_network_containers_url("http://dnc", "infra", "node1", &options.dnc_api_version);
        let service = RestService::with_boot_time(
            options,
            ServiceDeps::in_memory(nma.clone(), dnc.clone()),
            None,
        )
        .unwrap();
        service
            .set_orchestrator_type(SetOrchestratorTypeRequest {
                orchestrator_type: OrchestratorType::KubernetesCRD,
                node_id: "node1".to_string(),
                ..Default::default()
            })
            .await;
        (service, nma, dnc, url)
    }

    #[test]
    fn test_hint() {
        let list = NcVersionListResponse {
            http_status_code: "200".to_string(),
            network_containers: vec![
                NcVersion {
                    network_container_id: "nc1".to_string(),
                    version: "4".to_string(),
                },
                NcVersion {
                    network_container_id: "nc2".to_string(),
                    version: String::new(),
                },
            ],
        };
        assert_eq!(host_version_hint(Some(&list), "nc1"), HostVersionHint::Observed(4));
        assert_eq!(host_version_hint(Some(&list), "nc2"), HostVersionHint::Unobserved);
        assert_eq!(host_version_hint(Some(&list), "nc3"), HostVersionHint::Unobserved);
        assert_eq!(host_version_hint(None, "nc1"), HostVersionHint::Ungated);
    }

    #[tokio::test]
    async fn test_sync_adds_and_deletes() {
        let (service, nma, dnc, url) = managed_service().await;
        service
            .save_network_container(nc_request("stale", "1", &[]), HostVersionHint::Observed(1))
            .await;

        dnc.set_node_info(
            &url,
            NodeInfoResponse {
                network_containers: vec![nc_request("nc1", "2", &[("a", "10.0.0.4", 1), ("b", "10.0.0.5", 2)])],
            },
        );
        nma.set_nc_version("nc1", "1");

        service.sync_node_status().await.unwrap();
        let state = service.persisted_state().await;
        assert!(!state.container_status.contains_key("stale"));
        assert_eq!(state.container_status["nc1"].host_version, "1");
        assert_eq!(state.pod_ip_config_state["a"].state(), IPConfigState::Available);
        assert_eq!(state.pod_ip_config_state["b"].state(), IPConfigState::PendingProgramming);
    }

    #[tokio::test]
    async fn test_sync_without_host_versions_is_ungated() {
        let (service, nma, dnc, url) = managed_service().await;
        dnc.set_node_info(
            &url,
            NodeInfoResponse {
                network_containers: vec![nc_request("nc1", "2", &[("a", "10.0.0.4", 2)])],
            },
        );
        nma.fail_with(Some(NmAgentError::InternalServerError("down".to_string())));

        service.sync_node_status().await.unwrap();
        let state = service.persisted_state().await;
        assert_eq!(state.container_status["nc1"].host_version, "-1");
        assert_eq!(state.pod_ip_config_state["a"].state(), IPConfigState::Available);
    }

    #[tokio::test]
    async fn test_sync_controller_failure() {
        let (service, _, _, _) = managed_service().await;
        let err = service.sync_node_status().await.unwrap_err();
        assert_eq!(err.return_code, ResponseCode::CallToHostFailed);
    }
}
