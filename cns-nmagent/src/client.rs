//! Host agent capability trait and its HTTP implementation.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{NmAgentError, Result};
use crate::types::*;

/// Default deadline for every host agent call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Well-known address of the host agent.
pub const DEFAULT_BASE_URL: &str = "http://168.63.129.16";

const SUPPORTED_APIS_PATH: &str = "/machine/plugins/?comp=nmagent&type=GetSupportedApis";
const NC_VERSION_LIST_PATH: &str =
    "/machine/plugins/?comp=nmagent&type=NetworkManagement/interfaces/api-version/2";
const HOME_AZ_PATH: &str = "/machine/plugins/?comp=nmagent&type=GetHomeAz/api-version/1";

/// Legacy URL of a single NC's programmed version, authenticated by the
/// NC's token.
pub fn nc_version_url(base_url: &str, primary_interface: &str, nc_id: &str, token: &str) -> String {
    format!(
        "{}/machine/plugins/?comp=nmagent&type=NetworkManagement/interfaces/{}/networkContainers/{}/authenticationToken/{}/api-version/1",
        base_url.trim_end_matches('/'),
        primary_interface,
        nc_id,
        token
    )
}

/// Calls the agent makes against the node-local host networking agent.
///
/// Implementations must honour their own deadline; callers do not wrap
/// these calls in an extra timeout.
#[async_trait]
pub trait NmAgentClient: Send + Sync {
    /// Names of the APIs the host agent supports.
    async fn supported_apis(&self) -> Result<Vec<String>>;

    /// Programmed version of every NC known to the host.
    async fn nc_version_list(&self) -> Result<NcVersionListResponse>;

    /// Programmed version of a single NC through its authenticated URL.
    async fn nc_version(&self, url: &str) -> Result<NcVersion>;

    /// Availability zone of the node.
    async fn home_az(&self) -> Result<u32>;

    /// Join the host to a virtual network.
    async fn join_network(&self, url: &str) -> Result<HostResponse>;

    /// Forward an NC create body to the host agent.
    async fn put_network_container(&self, url: &str, body: String) -> Result<HostResponse>;

    /// Ask the host agent to delete an NC.
    async fn delete_network_container(&self, url: &str) -> Result<HostResponse>;
}

/// Connection settings for [`HttpNmAgentClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Whole-call deadline.
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Map an outer HTTP status and the inner `httpStatusCode` to a result.
///
/// An outer 200 with an inner 401 is an authentication failure.
pub fn check_status(outer: u16, inner: &str, body: &str) -> Result<()> {
    match outer {
        401 => return Err(NmAgentError::Unauthorized(body.to_string())),
        500 => return Err(NmAgentError::InternalServerError(body.to_string())),
        200..=299 => {}
        status => {
            return Err(NmAgentError::UnexpectedStatus {
                status,
                body: body.to_string(),
            })
        }
    }

    let inner = inner.trim();
    if inner.is_empty() {
        return Ok(());
    }
    match inner.parse::<u16>() {
        Ok(200..=299) => Ok(()),
        Ok(401) => Err(NmAgentError::Unauthorized(body.to_string())),
        Ok(500) => Err(NmAgentError::InternalServerError(body.to_string())),
        Ok(status) => Err(NmAgentError::UnexpectedStatus {
            status,
            body: body.to_string(),
        }),
        Err(_) => Err(NmAgentError::Decode(format!(
            "invalid inner status code {:?}",
            inner
        ))),
    }
}

/// Bodies that carry an inner status code.
trait InnerStatus {
    fn inner_status(&self) -> &str;
}

impl InnerStatus for SupportedApisResponse {
    fn inner_status(&self) -> &str {
        &self.http_status_code
    }
}

impl InnerStatus for NcVersionResponse {
    fn inner_status(&self) -> &str {
        &self.http_status_code
    }
}

impl InnerStatus for NcVersionListResponse {
    fn inner_status(&self) -> &str {
        &self.http_status_code
    }
}

impl InnerStatus for HomeAzBody {
    fn inner_status(&self) -> &str {
        &self.http_status_code
    }
}

/// reqwest-backed host agent client.
pub struct HttpNmAgentClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpNmAgentClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| NmAgentError::InvalidRequest(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<HostResponse> {
        let fut = async {
            let response = request.send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok::<_, NmAgentError>(HostResponse { status, body })
        };

        match tokio::time::timeout(self.config.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(NmAgentError::Timeout(self.config.timeout)),
        }
    }

    async fn get_checked<T>(&self, url: &str) -> Result<T>
    where
        T: DeserializeOwned + InnerStatus,
    {
        let response = self.send(self.client.get(url)).await?;
        check_status(response.status, "", &response.body)?;

        let parsed: T = serde_json::from_str(&response.body)
            .map_err(|e| NmAgentError::Decode(e.to_string()))?;
        check_status(response.status, parsed.inner_status(), &response.body)?;

        Ok(parsed)
    }

    async fn post_passthrough(&self, url: &str, body: Option<String>) -> Result<HostResponse> {
        let mut request = self.client.post(url);
        if let Some(body) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = self.send(request).await?;
        if let Err(e) = check_status(response.status, "", &response.body) {
            warn!(url = %url, status = response.status, "Host agent rejected request");
            return Err(e);
        }
        Ok(response)
    }
}

#[async_trait]
impl NmAgentClient for HttpNmAgentClient {
    #[instrument(skip(self))]
    async fn supported_apis(&self) -> Result<Vec<String>> {
        let body: SupportedApisResponse = self.get_checked(&self.url(SUPPORTED_APIS_PATH)).await?;
        debug!(apis = ?body.supported_apis, "Host agent supported APIs");
        Ok(body.supported_apis)
    }

    #[instrument(skip(self))]
    async fn nc_version_list(&self) -> Result<NcVersionListResponse> {
        self.get_checked(&self.url(NC_VERSION_LIST_PATH)).await
    }

    #[instrument(skip(self, url))]
    async fn nc_version(&self, url: &str) -> Result<NcVersion> {
        let body: NcVersionResponse = self.get_checked(url).await?;
        Ok(body.nc)
    }

    #[instrument(skip(self))]
    async fn home_az(&self) -> Result<u32> {
        let body: HomeAzBody = self.get_checked(&self.url(HOME_AZ_PATH)).await?;
        Ok(body.home_az)
    }

    #[instrument(skip(self))]
    async fn join_network(&self, url: &str) -> Result<HostResponse> {
        self.post_passthrough(url, None).await
    }

    #[instrument(skip(self, body))]
    async fn put_network_container(&self, url: &str, body: String) -> Result<HostResponse> {
        self.post_passthrough(url, Some(body)).await
    }

    #[instrument(skip(self))]
    async fn delete_network_container(&self, url: &str) -> Result<HostResponse> {
        self.post_passthrough(url, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outer_status_mapping() {
        assert!(check_status(200, "", "").is_ok());
        assert_eq!(
            check_status(401, "", "denied"),
            Err(NmAgentError::Unauthorized("denied".to_string()))
        );
        assert_eq!(
            check_status(500, "", "boom"),
            Err(NmAgentError::InternalServerError("boom".to_string()))
        );
        assert_eq!(
            check_status(404, "", "missing"),
            Err(NmAgentError::UnexpectedStatus {
                status: 404,
                body: "missing".to_string()
            })
        );
    }

    #[test]
    fn test_inner_unauthorized_with_outer_ok() {
        let err = check_status(200, "401", "{}").unwrap_err();
        assert_eq!(err, NmAgentError::Unauthorized("{}".to_string()));
        assert_eq!(err.code(), cns_types::ResponseCode::StatusUnauthorized);
    }

    #[test]
    fn test_inner_status_variants() {
        assert!(check_status(200, "200", "").is_ok());
        assert!(matches!(
            check_status(200, "500", ""),
            Err(NmAgentError::InternalServerError(_))
        ));
        assert!(matches!(
            check_status(200, "abc", ""),
            Err(NmAgentError::Decode(_))
        ));
    }

    #[test]
    fn test_version_list_lookup() {
        let json = r#"{
            "httpStatusCode": "200",
            "networkContainers": [
                {"networkContainerId": "nc1", "version": "2"},
                {"networkContainerId": "nc2", "version": "3"}
            ]
        }"#;
        let list: NcVersionListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(list.version_of("nc2"), Some("3"));
        assert_eq!(list.version_of("nc9"), None);
    }
}
