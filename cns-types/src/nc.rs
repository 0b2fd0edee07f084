//! Network container goal state and the requests that carry it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::Response;

/// Kind of network container. Unknown kinds survive decoding so that the
/// registry can reject them with a precise return code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NetworkContainerType {
    AzureContainerInstance,
    Docker,
    Kubernetes,
    Basic,
    JobObject,
    Cow,
    WebApps,
    Unsupported(String),
}

impl NetworkContainerType {
    pub fn as_str(&self) -> &str {
        match self {
            NetworkContainerType::AzureContainerInstance => "AzureContainerInstance",
            NetworkContainerType::Docker => "Docker",
            NetworkContainerType::Kubernetes => "Kubernetes",
            NetworkContainerType::Basic => "Basic",
            NetworkContainerType::JobObject => "JobObject",
            NetworkContainerType::Cow => "COW",
            NetworkContainerType::WebApps => "WebApps",
            NetworkContainerType::Unsupported(other) => other,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, NetworkContainerType::Unsupported(_))
    }
}

impl Default for NetworkContainerType {
    fn default() -> Self {
        Self::Docker
    }
}

impl From<String> for NetworkContainerType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "AzureContainerInstance" => NetworkContainerType::AzureContainerInstance,
            "Docker" => NetworkContainerType::Docker,
            "Kubernetes" => NetworkContainerType::Kubernetes,
            "Basic" => NetworkContainerType::Basic,
            "JobObject" => NetworkContainerType::JobObject,
            "COW" => NetworkContainerType::Cow,
            "WebApps" => NetworkContainerType::WebApps,
            _ => NetworkContainerType::Unsupported(s),
        }
    }
}

impl From<NetworkContainerType> for String {
    fn from(t: NetworkContainerType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for NetworkContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An address with its prefix length.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IPSubnet {
    #[serde(rename = "IPAddress", default)]
    pub ip_address: String,
    #[serde(rename = "PrefixLength", default)]
    pub prefix_length: u8,
}

impl IPSubnet {
    pub fn new(ip_address: impl Into<String>, prefix_length: u8) -> Self {
        Self {
            ip_address: ip_address.into(),
            prefix_length,
        }
    }
}

/// Primary interface configuration of an NC. Immutable for the NC's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IPConfiguration {
    #[serde(rename = "IPSubnet", default)]
    pub ip_subnet: IPSubnet,
    #[serde(rename = "DNSServers", default)]
    pub dns_servers: Vec<String>,
    #[serde(rename = "GatewayIPAddress", default)]
    pub gateway_ip_address: String,
}

/// A secondary IP carved out of an NC, keyed by its UUID in the goal state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryIPConfig {
    #[serde(rename = "IPAddress", default)]
    pub ip_address: String,
    /// NC version at which this IP was introduced.
    #[serde(rename = "NCVersion", default)]
    pub nc_version: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    #[serde(rename = "IPAddress", default)]
    pub ip_address: String,
    #[serde(rename = "GatewayIPAddress", default)]
    pub gateway_ip_address: String,
    #[serde(rename = "InterfaceToUse", default)]
    pub interface_to_use: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiTenancyInfo {
    #[serde(rename = "EncapType", default)]
    pub encap_type: String,
    #[serde(rename = "ID", default)]
    pub id: i64,
}

/// Full goal state of a network container as pushed by the cluster controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateNetworkContainerRequest {
    #[serde(rename = "Version", default)]
    pub version: String,
    #[serde(rename = "NetworkContainerType", default)]
    pub network_container_type: NetworkContainerType,
    #[serde(rename = "NetworkContainerid", default)]
    pub network_container_id: String,
    #[serde(rename = "PrimaryInterfaceIdentifier", default)]
    pub primary_interface_identifier: String,
    #[serde(rename = "AuthorizationToken", default, skip_serializing_if = "String::is_empty")]
    pub authorization_token: String,
    #[serde(rename = "LocalIPConfiguration", default)]
    pub local_ip_configuration: IPConfiguration,
    #[serde(rename = "OrchestratorContext", default)]
    pub orchestrator_context: serde_json::Value,
    #[serde(rename = "IPConfiguration", default)]
    pub ip_configuration: IPConfiguration,
    /// Ordered so that persisted state is byte-stable across saves.
    #[serde(rename = "SecondaryIPConfigs", default)]
    pub secondary_ip_configs: BTreeMap<String, SecondaryIPConfig>,
    #[serde(rename = "MultiTenancyInfo", default)]
    pub multi_tenancy_info: MultiTenancyInfo,
    #[serde(rename = "CnetAddressSpace", default)]
    pub cnet_address_space: Vec<IPSubnet>,
    #[serde(rename = "Routes", default)]
    pub routes: Vec<Route>,
    #[serde(rename = "AllowHostToNCCommunication", default)]
    pub allow_host_to_nc_communication: bool,
    #[serde(rename = "AllowNCToHostCommunication", default)]
    pub allow_nc_to_host_communication: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateNetworkContainerResponse {
    #[serde(rename = "Response")]
    pub response: Response,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteNetworkContainerRequest {
    #[serde(rename = "NetworkContainerid", default)]
    pub network_container_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteNetworkContainerResponse {
    #[serde(rename = "Response")]
    pub response: Response,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetNetworkContainerRequest {
    #[serde(rename = "NetworkContainerid", default)]
    pub network_container_id: String,
    #[serde(rename = "OrchestratorContext", default)]
    pub orchestrator_context: serde_json::Value,
}

/// NC view returned to callers. Omits the secondary IP set and any token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetNetworkContainerResponse {
    #[serde(rename = "NetworkContainerID", default)]
    pub network_container_id: String,
    #[serde(rename = "IPConfiguration", default)]
    pub ip_configuration: IPConfiguration,
    #[serde(rename = "Routes", default)]
    pub routes: Vec<Route>,
    #[serde(rename = "CnetAddressSpace", default)]
    pub cnet_address_space: Vec<IPSubnet>,
    #[serde(rename = "MultiTenancyInfo", default)]
    pub multi_tenancy_info: MultiTenancyInfo,
    #[serde(rename = "PrimaryInterfaceIdentifier", default)]
    pub primary_interface_identifier: String,
    #[serde(rename = "LocalIPConfiguration", default)]
    pub local_ip_configuration: IPConfiguration,
    #[serde(rename = "AllowHostToNCCommunication", default)]
    pub allow_host_to_nc_communication: bool,
    #[serde(rename = "AllowNCToHostCommunication", default)]
    pub allow_nc_to_host_communication: bool,
    #[serde(rename = "Response")]
    pub response: Response,
}

impl GetNetworkContainerResponse {
    /// Project a saved goal state into the caller-facing view.
    pub fn from_request(req: &CreateNetworkContainerRequest, response: Response) -> Self {
        Self {
            network_container_id: req.network_container_id.clone(),
            ip_configuration: req.ip_configuration.clone(),
            routes: req.routes.clone(),
            cnet_address_space: req.cnet_address_space.clone(),
            multi_tenancy_info: req.multi_tenancy_info.clone(),
            primary_interface_identifier: req.primary_interface_identifier.clone(),
            local_ip_configuration: req.local_ip_configuration.clone(),
            allow_host_to_nc_communication: req.allow_host_to_nc_communication,
            allow_nc_to_host_communication: req.allow_nc_to_host_communication,
            response,
        }
    }

    /// An error-only view.
    pub fn error(response: Response) -> Self {
        Self {
            response,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetAllNetworkContainersResponse {
    #[serde(rename = "NetworkContainers", default)]
    pub network_containers: Vec<GetNetworkContainerResponse>,
    #[serde(rename = "Response")]
    pub response: Response,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostNetworkContainersRequest {
    #[serde(rename = "CreateNetworkContainerRequests", default)]
    pub create_network_container_requests: Vec<CreateNetworkContainerRequest>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostNetworkContainersResponse {
    #[serde(rename = "Response")]
    pub response: Response,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_type_round_trip() {
        let t: NetworkContainerType = serde_json::from_str("\"COW\"").unwrap();
        assert_eq!(t, NetworkContainerType::Cow);
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"COW\"");

        let t: NetworkContainerType = serde_json::from_str("\"ClearContainer\"").unwrap();
        assert!(!t.is_supported());
        assert_eq!(t.as_str(), "ClearContainer");
    }

    #[test]
    fn test_create_request_wire_names() {
        let json = r#"{
            "Version": "3",
            "NetworkContainerType": "Docker",
            "NetworkContainerid": "nc1",
            "IPConfiguration": {
                "IPSubnet": {"IPAddress": "10.0.0.0", "PrefixLength": 24},
                "GatewayIPAddress": "10.0.0.1"
            },
            "SecondaryIPConfigs": {
                "uuid-A": {"IPAddress": "10.0.0.5", "NCVersion": 3}
            }
        }"#;
        let req: CreateNetworkContainerRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.network_container_id, "nc1");
        assert_eq!(req.ip_configuration.ip_subnet.prefix_length, 24);
        assert_eq!(req.secondary_ip_configs["uuid-A"].nc_version, 3);

        let out = serde_json::to_value(&req).unwrap();
        assert!(out.get("AuthorizationToken").is_none());
    }
}
