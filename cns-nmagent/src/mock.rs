//! In-memory host agent for tests and development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::client::NmAgentClient;
use crate::error::{NmAgentError, Result};
use crate::types::*;

#[derive(Default)]
struct MockState {
    supported_apis: Vec<String>,
    versions: HashMap<String, String>,
    home_az: Option<u32>,
    fail_with: Option<NmAgentError>,
    joined: Vec<String>,
    puts: Vec<(String, String)>,
    deletes: Vec<String>,
    version_list_calls: usize,
}

/// Mock host agent.
///
/// Versions, supported APIs and the home AZ are set by the test. A failure
/// injected with [`MockNmAgent::fail_with`] is returned by every call until
/// cleared.
#[derive(Default)]
pub struct MockNmAgent {
    state: RwLock<MockState>,
}

impl MockNmAgent {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> Result<R> {
        let mut state = self
            .state
            .write()
            .map_err(|_| NmAgentError::InternalServerError("Lock poisoned".to_string()))?;
        Ok(f(&mut state))
    }

    fn check_failure(&self) -> Result<()> {
        match self.with_state(|s| s.fail_with.clone())? {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Report `version` as the programmed version of `nc_id`.
    pub fn set_nc_version(&self, nc_id: &str, version: &str) {
        let _ = self.with_state(|s| s.versions.insert(nc_id.to_string(), version.to_string()));
    }

    pub fn set_supported_apis(&self, apis: &[&str]) {
        let _ = self.with_state(|s| {
            s.supported_apis = apis.iter().map(|a| a.to_string()).collect();
        });
    }

    pub fn set_home_az(&self, az: u32) {
        let _ = self.with_state(|s| s.home_az = Some(az));
    }

    /// Make every call fail with `err`; `None` restores normal behaviour.
    pub fn fail_with(&self, err: Option<NmAgentError>) {
        let _ = self.with_state(|s| s.fail_with = err);
    }

    /// URLs passed to `join_network`, in call order.
    pub fn joined_networks(&self) -> Vec<String> {
        self.with_state(|s| s.joined.clone()).unwrap_or_default()
    }

    /// (url, body) pairs passed to `put_network_container`.
    pub fn published(&self) -> Vec<(String, String)> {
        self.with_state(|s| s.puts.clone()).unwrap_or_default()
    }

    pub fn unpublished(&self) -> Vec<String> {
        self.with_state(|s| s.deletes.clone()).unwrap_or_default()
    }

    pub fn version_list_calls(&self) -> usize {
        self.with_state(|s| s.version_list_calls).unwrap_or_default()
    }
}

#[async_trait]
impl NmAgentClient for MockNmAgent {
    async fn supported_apis(&self) -> Result<Vec<String>> {
        self.check_failure()?;
        self.with_state(|s| s.supported_apis.clone())
    }

    async fn nc_version_list(&self) -> Result<NcVersionListResponse> {
        self.with_state(|s| s.version_list_calls += 1)?;
        self.check_failure()?;
        self.with_state(|s| {
            let mut network_containers: Vec<NcVersion> = s
                .versions
                .iter()
                .map(|(id, version)| NcVersion {
                    network_container_id: id.clone(),
                    version: version.clone(),
                })
                .collect();
            network_containers.sort_by(|a, b| a.network_container_id.cmp(&b.network_container_id));
            NcVersionListResponse {
                http_status_code: "200".to_string(),
                network_containers,
            }
        })
    }

    async fn nc_version(&self, url: &str) -> Result<NcVersion> {
        self.check_failure()?;
        // The NC id follows `networkContainers/` in the legacy URL, else it
        // is the last path segment.
        let nc_id = match url.split_once("networkContainers/") {
            Some((_, rest)) => rest.split('/').next().unwrap_or_default(),
            None => url
                .split('?')
                .next()
                .and_then(|path| path.trim_end_matches('/').rsplit('/').next())
                .unwrap_or_default(),
        }
        .to_string();
        let version = self.with_state(|s| s.versions.get(&nc_id).cloned())?;
        match version {
            Some(version) => Ok(NcVersion {
                network_container_id: nc_id,
                version,
            }),
            None => Err(NmAgentError::UnexpectedStatus {
                status: 404,
                body: format!("unknown network container {}", nc_id),
            }),
        }
    }

    async fn home_az(&self) -> Result<u32> {
        self.check_failure()?;
        match self.with_state(|s| s.home_az)? {
            Some(az) => Ok(az),
            None => Err(NmAgentError::UnexpectedStatus {
                status: 404,
                body: "home AZ not set".to_string(),
            }),
        }
    }

    async fn join_network(&self, url: &str) -> Result<HostResponse> {
        self.check_failure()?;
        self.with_state(|s| s.joined.push(url.to_string()))?;
        Ok(HostResponse {
            status: 200,
            body: String::new(),
        })
    }

    async fn put_network_container(&self, url: &str, body: String) -> Result<HostResponse> {
        self.check_failure()?;
        self.with_state(|s| s.puts.push((url.to_string(), body)))?;
        Ok(HostResponse {
            status: 200,
            body: String::new(),
        })
    }

    async fn delete_network_container(&self, url: &str) -> Result<HostResponse> {
        self.check_failure()?;
        self.with_state(|s| s.deletes.push(url.to_string()))?;
        Ok(HostResponse {
            status: 200,
            body: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_versions() {
        let nma = MockNmAgent::new();
        nma.set_nc_version("nc1", "4");

        let list = nma.nc_version_list().await.unwrap();
        assert_eq!(list.version_of("nc1"), Some("4"));
        assert_eq!(nma.version_list_calls(), 1);

        let nc = nma.nc_version("http://host/nc/nc1?api-version=1").await.unwrap();
        assert_eq!(nc.version, "4");

        let url = crate::nc_version_url("http://host", "eth0-mac", "nc1", "token");
        assert_eq!(nma.nc_version(&url).await.unwrap().network_container_id, "nc1");
    }

    #[tokio::test]
    async fn test_mock_failure_injection() {
        let nma = MockNmAgent::new();
        nma.fail_with(Some(NmAgentError::Unauthorized("nope".to_string())));
        assert!(matches!(
            nma.supported_apis().await,
            Err(NmAgentError::Unauthorized(_))
        ));

        nma.fail_with(None);
        assert!(nma.supported_apis().await.unwrap().is_empty());
    }
}
