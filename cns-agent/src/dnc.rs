//! Client for the cluster-level network controller.
//!
//! Only used in Managed mode to pull the authoritative NC list of the node.

use async_trait::async_trait;
use cns_types::{NodeInfoResponse, ResponseCode};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DncError {
    #[error("Request to cluster controller failed: {0}")]
    Transport(String),

    #[error("Cluster controller returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode cluster controller response: {0}")]
    Decode(String),

    #[error("Cluster controller is not configured: {0}")]
    NotConfigured(String),
}

impl DncError {
    pub fn code(&self) -> ResponseCode {
        match self {
            DncError::Transport(_) => ResponseCode::UnreachableHost,
            DncError::Status { .. } => ResponseCode::CallToHostFailed,
            DncError::Decode(_) => ResponseCode::UnexpectedError,
            DncError::NotConfigured(_) => ResponseCode::InvalidParameter,
        }
    }
}

impl From<reqwest::Error> for DncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            DncError::Decode(e.to_string())
        } else {
            DncError::Transport(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, DncError>;

/// URL of the node's NC list on the cluster controller.
pub fn sync_node_network_containers_url(
    dnc_endpoint: &str,
    infra_vnet: &str,
    node_id: &str,
    api_version: &str,
) -> String {
    format!(
        "{}/{}/{}?api-version={}",
        dnc_endpoint.trim_end_matches('/'),
        infra_vnet,
        node_id,
        api_version
    )
}

#[async_trait]
pub trait DncClient: Send + Sync {
    /// Fetch the goal state of every NC of a node.
    async fn get_node_info(&self, url: &str) -> Result<NodeInfoResponse>;
}

/// reqwest-backed cluster controller client.
pub struct HttpDncClient {
    client: reqwest::Client,
}

impl HttpDncClient {
    pub fn new(connect_timeout: Duration, response_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(response_timeout)
            .build()
            .map_err(|e| DncError::NotConfigured(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DncClient for HttpDncClient {
    #[instrument(skip(self))]
    async fn get_node_info(&self, url: &str) -> Result<NodeInfoResponse> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DncError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let info: NodeInfoResponse =
            serde_json::from_str(&body).map_err(|e| DncError::Decode(e.to_string()))?;
        debug!(count = info.network_containers.len(), "Fetched node network containers");
        Ok(info)
    }
}

/// In-memory cluster controller keyed by URL.
#[derive(Default)]
pub struct MockDncClient {
    responses: RwLock<HashMap<String, NodeInfoResponse>>,
    calls: RwLock<Vec<String>>,
}

impl MockDncClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_node_info(&self, url: &str, info: NodeInfoResponse) {
        if let Ok(mut responses) = self.responses.write() {
            responses.insert(url.to_string(), info);
        }
    }

    /// URLs requested so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DncClient for MockDncClient {
    async fn get_node_info(&self, url: &str) -> Result<NodeInfoResponse> {
        if let Ok(mut calls) = self.calls.write() {
            calls.push(url.to_string());
        }
        let responses = self
            .responses
            .read()
            .map_err(|_| DncError::Transport("Lock poisoned".to_string()))?;
        responses.get(url).cloned().ok_or_else(|| DncError::Status {
            status: 404,
            body: format!("no node info for {}", url),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_url() {
        assert_eq!(
            sync_node_network_containers_url("http://dnc/", "infra-vnet", "node-1", "2018-03-01"),
            "http://dnc/infra-vnet/node-1?api-version=2018-03-01"
        );
    }

    #[tokio::test]
    async fn test_mock_records_calls() {
        let dnc = MockDncClient::new();
        dnc.set_node_info("u1", NodeInfoResponse::default());

        assert!(dnc.get_node_info("u1").await.is_ok());
        let err = dnc.get_node_info("u2").await.unwrap_err();
        assert_eq!(err.code(), ResponseCode::CallToHostFailed);
        assert_eq!(dnc.calls(), vec!["u1".to_string(), "u2".to_string()]);
    }
}
