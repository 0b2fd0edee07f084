//! Publish and unpublish NCs through the host agent.
//!
//! The caller hands over pre-built host agent URLs and a raw create body.
//! The agent joins the NC's network once per network id, then forwards the
//! body. Upstream status and body are returned verbatim.

use cns_nmagent::NmAgentError;
use cns_types::{
    PublishNetworkContainerRequest, PublishNetworkContainerResponse, Response, ResponseCode,
    UnpublishNetworkContainerRequest, UnpublishNetworkContainerResponse,
};
use tracing::{info, instrument};

use crate::named_lock::JOINED_NETWORKS_LOCK;
use crate::service::{failure, RestService};

impl RestService {
    #[instrument(skip(self, req), fields(nc_id = %req.network_container_id, network_id = %req.network_id))]
    pub async fn publish_network_container(
        &self,
        req: PublishNetworkContainerRequest,
    ) -> PublishNetworkContainerResponse {
        if let Err(e) = self.join_network_once(&req.network_id, &req.join_network_url).await {
            return PublishNetworkContainerResponse {
                response: failure(
                    ResponseCode::NetworkJoinFailed,
                    format!("Failed to join network {}: {}", req.network_id, e),
                ),
                publish_error_str: e.to_string(),
                publish_status_code: e.status().unwrap_or_default(),
                publish_response_body: String::new(),
            };
        }

        match self
            .nmagent
            .put_network_container(
                &req.create_network_container_url,
                req.create_network_container_request_body,
            )
            .await
        {
            Ok(upstream) => {
                info!(status = upstream.status, "Network container published");
                PublishNetworkContainerResponse {
                    response: Response::success(),
                    publish_error_str: String::new(),
                    publish_status_code: upstream.status,
                    publish_response_body: upstream.body,
                }
            }
            Err(e) => PublishNetworkContainerResponse {
                response: failure(
                    ResponseCode::NetworkContainerPublishFailed,
                    format!("Failed to publish network container: {}", e),
                ),
                publish_error_str: e.to_string(),
                publish_status_code: e.status().unwrap_or_default(),
                publish_response_body: upstream_body(&e),
            },
        }
    }

    #[instrument(skip(self, req), fields(nc_id = %req.network_container_id, network_id = %req.network_id))]
    pub async fn unpublish_network_container(
        &self,
        req: UnpublishNetworkContainerRequest,
    ) -> UnpublishNetworkContainerResponse {
        if let Err(e) = self.join_network_once(&req.network_id, &req.join_network_url).await {
            return UnpublishNetworkContainerResponse {
                response: failure(
                    ResponseCode::NetworkJoinFailed,
                    format!("Failed to join network {}: {}", req.network_id, e),
                ),
                unpublish_error_str: e.to_string(),
                unpublish_status_code: e.status().unwrap_or_default(),
                unpublish_response_body: String::new(),
            };
        }

        match self
            .nmagent
            .delete_network_container(&req.delete_network_container_url)
            .await
        {
            Ok(upstream) => {
                info!(status = upstream.status, "Network container unpublished");
                UnpublishNetworkContainerResponse {
                    response: Response::success(),
                    unpublish_error_str: String::new(),
                    unpublish_status_code: upstream.status,
                    unpublish_response_body: upstream.body,
                }
            }
            Err(e) => UnpublishNetworkContainerResponse {
                response: failure(
                    ResponseCode::NetworkContainerUnpublishFailed,
                    format!("Failed to unpublish network container: {}", e),
                ),
                unpublish_error_str: e.to_string(),
                unpublish_status_code: e.status().unwrap_or_default(),
                unpublish_response_body: upstream_body(&e),
            },
        }
    }

    /// Join `network_id` unless this node already has.
    ///
    /// Serialized on the joined-networks lock so concurrent publishes for
    /// the same network join only once.
    async fn join_network_once(&self, network_id: &str, join_url: &str) -> Result<(), NmAgentError> {
        let _guard = self.locks.lock(JOINED_NETWORKS_LOCK).await;

        if self.state.read().await.joined_networks.contains(network_id) {
            return Ok(());
        }

        let upstream = self.nmagent.join_network(join_url).await?;
        info!(network_id, status = upstream.status, "Joined network");

        let mut state = self.state.write().await;
        state.joined_networks.insert(network_id.to_string());
        // A lost write only costs a rejoin.
        self.persist_or_warn(&state);
        Ok(())
    }
}

fn upstream_body(e: &NmAgentError) -> String {
    match e {
        NmAgentError::UnexpectedStatus { body, .. } => body.clone(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use crate::service::tests::test_service;
    use cns_nmagent::NmAgentError;
    use cns_types::{PublishNetworkContainerRequest, ResponseCode, UnpublishNetworkContainerRequest};

    fn publish_request(network_id: &str) -> PublishNetworkContainerRequest {
        PublishNetworkContainerRequest {
            network_id: network_id.to_string(),
            network_container_id: "nc1".to_string(),
            join_network_url: format!("http://nma/joinedVirtualNetworks/{}", network_id),
            create_network_container_url: "http://nma/networkContainers/nc1".to_string(),
            create_network_container_request_body: r#"{"networkContainerId":"nc1"}"#.to_string(),
        }
    }

    #[tokio::test]
    async fn test_publish_joins_once() {
        let (service, nma) = test_service();

        let first = service.publish_network_container(publish_request("vnet1")).await;
        assert!(first.response.is_success());
        assert_eq!(first.publish_status_code, 200);
        let second = service.publish_network_container(publish_request("vnet1")).await;
        assert!(second.response.is_success());

        assert_eq!(nma.joined_networks().len(), 1);
        assert_eq!(nma.published().len(), 2);
        assert_eq!(nma.published()[0].1, r#"{"networkContainerId":"nc1"}"#);
        assert!(service.persisted_state().await.joined_networks.contains("vnet1"));
    }

    #[tokio::test]
    async fn test_publish_join_failure() {
        let (service, nma) = test_service();
        nma.fail_with(Some(NmAgentError::UnexpectedStatus {
            status: 403,
            body: "denied".to_string(),
        }));

        let resp = service.publish_network_container(publish_request("vnet1")).await;
        assert_eq!(resp.response.return_code, ResponseCode::NetworkJoinFailed);
        assert_eq!(resp.publish_status_code, 403);
        assert!(service.persisted_state().await.joined_networks.is_empty());
    }

    #[tokio::test]
    async fn test_unpublish() {
        let (service, nma) = test_service();
        let resp = service
            .unpublish_network_container(UnpublishNetworkContainerRequest {
                network_id: "vnet1".to_string(),
                network_container_id: "nc1".to_string(),
                join_network_url: "http://nma/joinedVirtualNetworks/vnet1".to_string(),
                delete_network_container_url: "http://nma/networkContainers/nc1/delete".to_string(),
            })
            .await;
        assert!(resp.response.is_success());
        assert_eq!(nma.unpublished(), vec!["http://nma/networkContainers/nc1/delete".to_string()]);
    }
}
