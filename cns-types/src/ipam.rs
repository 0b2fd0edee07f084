//! IP allocation requests exchanged with the CNI plugin.

use serde::{Deserialize, Serialize};

use crate::nc::{IPConfiguration, IPSubnet};
use crate::Response;

/// State of a secondary IP in the node pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IPConfigState {
    Available,
    Assigned,
    PendingRelease,
    PendingProgramming,
}

impl IPConfigState {
    pub const ALL: [IPConfigState; 4] = [
        IPConfigState::Available,
        IPConfigState::Assigned,
        IPConfigState::PendingRelease,
        IPConfigState::PendingProgramming,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IPConfigState::Available => "Available",
            IPConfigState::Assigned => "Assigned",
            IPConfigState::PendingRelease => "PendingRelease",
            IPConfigState::PendingProgramming => "PendingProgramming",
        }
    }
}

impl std::fmt::Display for IPConfigState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IPConfigState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IPConfigState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown IP config state: {}", s))
    }
}

/// Pod identity carried inside an orchestrator context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KubernetesPodInfo {
    #[serde(rename = "PodName", default)]
    pub pod_name: String,
    #[serde(rename = "PodNamespace", default)]
    pub pod_namespace: String,
}

impl KubernetesPodInfo {
    pub fn new(pod_name: impl Into<String>, pod_namespace: impl Into<String>) -> Self {
        Self {
            pod_name: pod_name.into(),
            pod_namespace: pod_namespace.into(),
        }
    }

    /// Key of the per-pod NC context index (name followed by namespace).
    pub fn orchestrator_context_key(&self) -> String {
        format!("{}{}", self.pod_name, self.pod_namespace)
    }

    /// Decode an orchestrator context blob.
    pub fn from_orchestrator_context(context: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(context.clone())
    }

    pub fn to_orchestrator_context(&self) -> serde_json::Value {
        serde_json::json!({
            "PodName": self.pod_name,
            "PodNamespace": self.pod_namespace,
        })
    }
}

/// Request for (or release of) a pod IP.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IPConfigRequest {
    #[serde(rename = "DesiredIPAddress", default)]
    pub desired_ip_address: String,
    #[serde(rename = "PodInterfaceID", default)]
    pub pod_interface_id: String,
    #[serde(rename = "InfraContainerID", default)]
    pub infra_container_id: String,
    #[serde(rename = "OrchestratorContext", default)]
    pub orchestrator_context: serde_json::Value,
    #[serde(rename = "Ifname", default)]
    pub ifname: String,
}

/// Host primary interface details returned alongside a pod IP.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostIPInfo {
    #[serde(rename = "Gateway", default)]
    pub gateway: String,
    #[serde(rename = "PrimaryIP", default)]
    pub primary_ip: String,
    #[serde(rename = "Subnet", default)]
    pub subnet: String,
}

/// Everything the CNI plugin needs to wire an assigned IP into a pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodIpInfo {
    #[serde(rename = "PodIPConfig")]
    pub pod_ip_config: IPSubnet,
    #[serde(rename = "NetworkContainerPrimaryIPConfig")]
    pub network_container_primary_ip_config: IPConfiguration,
    #[serde(rename = "HostPrimaryIPInfo")]
    pub host_primary_ip_info: HostIPInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IPConfigResponse {
    #[serde(rename = "PodIpInfo")]
    pub pod_ip_info: PodIpInfo,
    #[serde(rename = "Response")]
    pub response: Response,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_info_context_round_trip() {
        let pod = KubernetesPodInfo::new("p1", "ns1");
        let decoded = KubernetesPodInfo::from_orchestrator_context(&pod.to_orchestrator_context()).unwrap();
        assert_eq!(decoded, pod);
        assert_eq!(pod.orchestrator_context_key(), "p1ns1");
    }

    #[test]
    fn test_ip_config_request_wire_names() {
        let json = r#"{
            "DesiredIPAddress": "10.0.0.1",
            "PodInterfaceID": "abc-eth0",
            "InfraContainerID": "abc",
            "OrchestratorContext": {"PodName": "p1", "PodNamespace": "ns1"}
        }"#;
        let req: IPConfigRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.desired_ip_address, "10.0.0.1");
        assert_eq!(req.infra_container_id, "abc");
        assert!(req.ifname.is_empty());
    }

    #[test]
    fn test_ip_config_state_parse() {
        assert_eq!("assigned".parse::<IPConfigState>(), Ok(IPConfigState::Assigned));
        assert_eq!(
            "PendingProgramming".parse::<IPConfigState>(),
            Ok(IPConfigState::PendingProgramming)
        );
        assert!("Reserved".parse::<IPConfigState>().is_err());
    }
}
