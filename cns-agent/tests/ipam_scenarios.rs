//! End-to-end IPAM behavior through the public service API.

use cns_agent::dnc::MockDncClient;
use cns_agent::netplugin::RecordingNetPlugin;
use cns_agent::snat::RecordingSnat;
use cns_agent::store::JsonFileStore;
use cns_agent::{RestService, ServiceDeps, ServiceOptions};
use cns_nmagent::MockNmAgent;
use cns_types::{
    CreateNetworkContainerRequest, DeleteNetworkContainerRequest, IPConfigRequest, IPConfigState,
    IPConfiguration, IPSubnet, KubernetesPodInfo, OrchestratorType, ResponseCode,
    SecondaryIPConfig, SetOrchestratorTypeRequest,
};
use std::path::Path;
use std::sync::Arc;

fn options() -> ServiceOptions {
    ServiceOptions {
        node_id: "node1".to_string(),
        nmagent_base_url: "http://nma".to_string(),
        ..ServiceOptions::default()
    }
}

fn nc(id: &str, version: &str, ips: &[(&str, &str)]) -> CreateNetworkContainerRequest {
    CreateNetworkContainerRequest {
        network_container_id: id.to_string(),
        version: version.to_string(),
        ip_configuration: IPConfiguration {
            ip_subnet: IPSubnet::new("10.0.0.0", 24),
            dns_servers: vec![],
            gateway_ip_address: "10.0.0.254".to_string(),
        },
        secondary_ip_configs: ips
            .iter()
            .map(|(uuid, ip)| {
                (
                    uuid.to_string(),
                    SecondaryIPConfig {
                        ip_address: ip.to_string(),
                        nc_version: 0,
                    },
                )
            })
            .collect(),
        ..Default::default()
    }
}

fn pod(name: &str, desired: &str) -> IPConfigRequest {
    IPConfigRequest {
        desired_ip_address: desired.to_string(),
        infra_container_id: format!("{}-infra", name),
        orchestrator_context: KubernetesPodInfo::new(name, "ns1").to_orchestrator_context(),
        ..Default::default()
    }
}

/// A CRD service whose `nc1` owns uuid-A and uuid-B, both Available.
async fn service_with(deps: ServiceDeps, nma: &MockNmAgent) -> RestService {
    let service = RestService::with_boot_time(options(), deps, None).unwrap();
    let resp = service
        .set_orchestrator_type(SetOrchestratorTypeRequest {
            orchestrator_type: OrchestratorType::KubernetesCRD,
            node_id: "node1".to_string(),
            ..Default::default()
        })
        .await;
    assert!(resp.is_success());

    let resp = service
        .create_or_update_network_container(nc("nc1", "0", &[("uuid-A", "10.0.0.1"), ("uuid-B", "10.0.0.2")]))
        .await;
    assert!(resp.response.is_success(), "{:?}", resp.response);

    // New IPs wait for the host to report the NC version.
    nma.set_nc_version("nc1", "0");
    service.reconcile_host_versions().await.unwrap();
    service
}

async fn crd_service() -> RestService {
    let nma = Arc::new(MockNmAgent::new());
    let deps = ServiceDeps::in_memory(nma.clone(), Arc::new(MockDncClient::new()));
    service_with(deps, &nma).await
}

fn file_deps(dir: &Path, nma: Arc<MockNmAgent>) -> ServiceDeps {
    ServiceDeps {
        store: Arc::new(JsonFileStore::new(dir.join("cns.json")).unwrap()),
        endpoint_store: Arc::new(JsonFileStore::new(dir.join("endpoints.json")).unwrap()),
        nmagent: nma,
        dnc: Arc::new(MockDncClient::new()),
        net_plugin: Arc::new(RecordingNetPlugin::default()),
        snat: Arc::new(RecordingSnat::default()),
    }
}

#[tokio::test]
async fn test_allocation_scenarios() {
    let service = crd_service().await;

    // Allocate first, allocate next.
    let p1 = service.request_ip_config(pod("p1", "")).await;
    assert!(p1.response.is_success());
    assert_eq!(p1.pod_ip_info.pod_ip_config.ip_address, "10.0.0.1");
    let p2 = service.request_ip_config(pod("p2", "")).await;
    assert_eq!(p2.pod_ip_info.pod_ip_config.ip_address, "10.0.0.2");

    let state = service.persisted_state().await;
    assert_eq!(state.pod_ip_config_state["uuid-A"].state(), IPConfigState::Assigned);

    // Same pod is idempotent.
    let again = service.request_ip_config(pod("p1", "")).await;
    assert_eq!(again.pod_ip_info.pod_ip_config.ip_address, "10.0.0.1");

    // Desired IP collision.
    let p3 = service.request_ip_config(pod("p3", "10.0.0.1")).await;
    assert_eq!(p3.response.return_code, ResponseCode::FailedToAllocateIPConfig);

    // Release then re-request.
    assert!(service.release_ip_config(pod("p1", "")).await.is_success());
    let p3 = service.request_ip_config(pod("p3", "10.0.0.1")).await;
    assert!(p3.response.is_success());
    assert_eq!(p3.pod_ip_info.pod_ip_config.ip_address, "10.0.0.1");

    let state = service.persisted_state().await;
    let holder = state.pod_ip_config_state["uuid-A"].pod_info.as_ref().unwrap();
    assert_eq!(holder.pod_name, "p3");
}

#[tokio::test]
async fn test_nc_shrink_rejects_assigned_ip() {
    let service = crd_service().await;
    service.request_ip_config(pod("p1", "10.0.0.1")).await;
    let before = service.persisted_state().await.pod_ip_config_state;

    let resp = service
        .create_or_update_network_container(nc("nc1", "0", &[("uuid-B", "10.0.0.2")]))
        .await;
    assert_eq!(resp.response.return_code, ResponseCode::InconsistentIPConfigState);
    assert_eq!(service.persisted_state().await.pod_ip_config_state, before);
}

#[tokio::test]
async fn test_deleted_nc_keeps_assigned_ip_until_release() {
    let service = crd_service().await;
    assert!(service.request_ip_config(pod("p1", "10.0.0.1")).await.response.is_success());

    let resp = service
        .delete_network_container(DeleteNetworkContainerRequest {
            network_container_id: "nc1".to_string(),
        })
        .await;
    assert!(resp.response.is_success());
    let state = service.persisted_state().await;
    assert!(state.container_status.is_empty());
    assert_eq!(state.pod_ip_config_state.len(), 1);
    assert_eq!(state.pod_ip_config_state["uuid-A"].state(), IPConfigState::Assigned);

    assert!(service.release_ip_config(pod("p1", "")).await.is_success());
    let resp = service.request_ip_config(pod("p2", "")).await;
    assert_eq!(resp.response.return_code, ResponseCode::FailedToAllocateIPConfig);

    let state = service.persisted_state().await;
    assert!(state.pod_ip_config_state.is_empty());
    assert!(state.pod_ip_id_by_pod_interface_key.is_empty());
}

#[tokio::test]
async fn test_request_release_request_returns_same_ip() {
    let service = crd_service().await;

    let first = service.request_ip_config(pod("p1", "")).await;
    assert!(service.release_ip_config(pod("p1", "")).await.is_success());
    let second = service.request_ip_config(pod("p1", "")).await;
    assert_eq!(
        first.pod_ip_info.pod_ip_config.ip_address,
        second.pod_ip_info.pod_ip_config.ip_address
    );
}

#[tokio::test]
async fn test_exhausted_pool() {
    let service = crd_service().await;
    service.request_ip_config(pod("p1", "")).await;
    service.request_ip_config(pod("p2", "")).await;

    let resp = service.request_ip_config(pod("p3", "")).await;
    assert_eq!(resp.response.return_code, ResponseCode::FailedToAllocateIPConfig);
}

#[tokio::test]
async fn test_release_is_idempotent() {
    let service = crd_service().await;
    service.request_ip_config(pod("p1", "")).await;

    assert!(service.release_ip_config(pod("p1", "")).await.is_success());
    assert!(service.release_ip_config(pod("p1", "")).await.is_success());
    assert!(service.release_ip_config(pod("never", "")).await.is_success());
    assert!(service.persisted_state().await.pod_ip_id_by_pod_interface_key.is_empty());
}

#[tokio::test]
async fn test_concurrent_requests_get_distinct_ips() {
    let service = Arc::new(crd_service().await);

    let requests = ["p1", "p2"].map(|name| {
        let service = service.clone();
        async move { service.request_ip_config(pod(name, "")).await }
    });
    let mut ips: Vec<String> = futures::future::join_all(requests)
        .await
        .into_iter()
        .map(|r| r.pod_ip_info.pod_ip_config.ip_address)
        .collect();
    ips.sort();
    assert_eq!(ips, vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]);
}

#[tokio::test]
async fn test_resave_is_byte_equal_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let nma = Arc::new(MockNmAgent::new());
    let service = service_with(file_deps(dir.path(), nma.clone()), &nma).await;
    let path = dir.path().join("cns.json");

    let request = nc("nc1", "0", &[("uuid-A", "10.0.0.1"), ("uuid-B", "10.0.0.2")]);
    assert!(service.create_or_update_network_container(request.clone()).await.response.is_success());
    let first = std::fs::read(&path).unwrap();
    assert!(service.create_or_update_network_container(request).await.response.is_success());
    let second = std::fs::read(&path).unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let nma = Arc::new(MockNmAgent::new());
    let service = service_with(file_deps(dir.path(), nma.clone()), &nma).await;
    service.request_ip_config(pod("p1", "")).await;
    drop(service);

    let restarted = RestService::with_boot_time(options(), file_deps(dir.path(), nma), None).unwrap();
    let again = restarted.request_ip_config(pod("p1", "")).await;
    assert_eq!(again.pod_ip_info.pod_ip_config.ip_address, "10.0.0.1");
    let state = restarted.persisted_state().await;
    assert_eq!(state.orchestrator_type, OrchestratorType::KubernetesCRD);
    assert_eq!(state.pod_ip_config_state["uuid-B"].state(), IPConfigState::Available);
}
