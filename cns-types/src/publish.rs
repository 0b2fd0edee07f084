//! Publishing NC goal state to the host agent on behalf of the caller.

use serde::{Deserialize, Serialize};

use crate::Response;

/// Join `NetworkID` on the host, then forward the create body to the host agent.
///
/// The body is the raw JSON document the host agent expects; it is passed
/// through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishNetworkContainerRequest {
    #[serde(rename = "NetworkID", default)]
    pub network_id: String,
    #[serde(rename = "NetworkContainerID", default)]
    pub network_container_id: String,
    #[serde(rename = "JoinNetworkURL", default)]
    pub join_network_url: String,
    #[serde(rename = "CreateNetworkContainerURL", default)]
    pub create_network_container_url: String,
    #[serde(rename = "CreateNetworkContainerRequestBody", default)]
    pub create_network_container_request_body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishNetworkContainerResponse {
    #[serde(rename = "Response")]
    pub response: Response,
    #[serde(rename = "PublishErrorStr", default)]
    pub publish_error_str: String,
    #[serde(rename = "PublishStatusCode", default)]
    pub publish_status_code: u16,
    #[serde(rename = "PublishResponseBody", default)]
    pub publish_response_body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnpublishNetworkContainerRequest {
    #[serde(rename = "NetworkID", default)]
    pub network_id: String,
    #[serde(rename = "NetworkContainerID", default)]
    pub network_container_id: String,
    #[serde(rename = "JoinNetworkURL", default)]
    pub join_network_url: String,
    #[serde(rename = "DeleteNetworkContainerURL", default)]
    pub delete_network_container_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnpublishNetworkContainerResponse {
    #[serde(rename = "Response")]
    pub response: Response,
    #[serde(rename = "UnpublishErrorStr", default)]
    pub unpublish_error_str: String,
    #[serde(rename = "UnpublishStatusCode", default)]
    pub unpublish_status_code: u16,
    #[serde(rename = "UnpublishResponseBody", default)]
    pub unpublish_response_body: String,
}
