//! Node level queries: cluster controller sync, host capabilities, home AZ.

use serde::{Deserialize, Serialize};

use crate::nc::CreateNetworkContainerRequest;
use crate::Response;

/// Authoritative NC list for a node as returned by the cluster controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeInfoResponse {
    #[serde(rename = "NetworkContainers", default)]
    pub network_containers: Vec<CreateNetworkContainerRequest>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumOfCPUCoresResponse {
    #[serde(rename = "Response")]
    pub response: Response,
    #[serde(rename = "NumOfCPUCores", default)]
    pub num_of_cpu_cores: usize,
}

/// Cached availability zone answer. `IsSupported=false` is a valid answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeAzResponse {
    #[serde(rename = "IsSupported", default)]
    pub is_supported: bool,
    #[serde(rename = "HomeAz", default)]
    pub home_az: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetHomeAzResponse {
    #[serde(rename = "Response")]
    pub response: Response,
    #[serde(rename = "HomeAzResponse", default)]
    pub home_az_response: HomeAzResponse,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NmAgentSupportedApisRequest {
    #[serde(rename = "GetNmAgentSupportedApisURL", default)]
    pub get_nm_agent_supported_apis_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NmAgentSupportedApisResponse {
    #[serde(rename = "Response")]
    pub response: Response,
    #[serde(rename = "SupportedApis", default)]
    pub supported_apis: Vec<String>,
}

/// Attach or detach a container to the network of an NC.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigureContainerNetworkingRequest {
    #[serde(rename = "Containerid", default)]
    pub container_id: String,
    #[serde(rename = "NetworkContainerid", default)]
    pub network_container_id: String,
}
