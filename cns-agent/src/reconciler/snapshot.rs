//! Periodic log of every saved NC and the pool counts.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::service::RestService;

pub struct SnapshotEmitter {
    service: Arc<RestService>,
    interval: Duration,
}

impl SnapshotEmitter {
    pub fn new(service: Arc<RestService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// Log the current state and refresh the pool gauges.
    pub async fn emit(&self) {
        let state = self.service.state.read().await;
        for nc in state.containers.values() {
            info!(
                nc_id = %nc.id,
                version = %nc.request.version,
                host_version = %nc.host_version,
                vfp_update_complete = nc.vfp_update_complete,
                secondary_ips = nc.request.secondary_ip_configs.len(),
                "Network container snapshot"
            );
        }

        let counts = state.pool.counts();
        self.service.metrics.set_pool_counts(&counts);
        info!(
            ncs = state.containers.len(),
            available = counts.available,
            assigned = counts.assigned,
            pending_programming = counts.pending_programming,
            pending_release = counts.pending_release,
            "Pool snapshot"
        );
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut timer = interval(self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Snapshot emitter stopped");
                    return;
                }
                _ = timer.tick() => self.emit().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HostVersionHint;
    use crate::service::tests::{nc_request, test_service};
    use cns_types::{OrchestratorType, SetOrchestratorTypeRequest};

    #[tokio::test]
    async fn test_emit_refreshes_gauges() {
        let (service, _) = test_service();
        service
            .set_orchestrator_type(SetOrchestratorTypeRequest {
                orchestrator_type: OrchestratorType::KubernetesCRD,
                node_id: "node1".to_string(),
                ..Default::default()
            })
            .await;
        service
            .save_network_container(
                nc_request("nc1", "1", &[("a", "10.0.0.4", 1), ("b", "10.0.0.5", 1)]),
                HostVersionHint::Observed(1),
            )
            .await;
        let service = Arc::new(service);

        SnapshotEmitter::new(service.clone(), Duration::from_secs(60)).emit().await;
        let text = service.metrics().gather_text().unwrap();
        assert!(text.contains(r#"cns_pool_ips{state="Available"} 2"#));
    }
}
