//! Orchestrator identity and channel mode.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Orchestrator driving this node. Unknown names survive decoding so that
/// `setorchestratortype` can reject them with a precise return code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrchestratorType {
    Kubernetes,
    KubernetesCRD,
    ServiceFabric,
    Batch,
    DBforPostgreSQL,
    AzureFirstParty,
    WebApps,
    Unsupported(String),
}

impl OrchestratorType {
    pub fn as_str(&self) -> &str {
        match self {
            OrchestratorType::Kubernetes => "Kubernetes",
            OrchestratorType::KubernetesCRD => "KubernetesCRD",
            OrchestratorType::ServiceFabric => "ServiceFabric",
            OrchestratorType::Batch => "Batch",
            OrchestratorType::DBforPostgreSQL => "DBforPostgreSQL",
            OrchestratorType::AzureFirstParty => "AzureFirstParty",
            OrchestratorType::WebApps => "WebApps",
            OrchestratorType::Unsupported(other) => other,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, OrchestratorType::Unsupported(_))
    }

    /// CRD-driven orchestrators own the secondary IP pool of their NCs.
    pub fn is_crd(&self) -> bool {
        matches!(self, OrchestratorType::KubernetesCRD)
    }

    /// Orchestrators whose NCs are indexed by the owning pod's context.
    pub fn indexes_pod_context(&self) -> bool {
        matches!(
            self,
            OrchestratorType::Kubernetes
                | OrchestratorType::ServiceFabric
                | OrchestratorType::Batch
                | OrchestratorType::DBforPostgreSQL
                | OrchestratorType::AzureFirstParty
                | OrchestratorType::WebApps
        )
    }
}

impl Default for OrchestratorType {
    fn default() -> Self {
        Self::Unsupported(String::new())
    }
}

impl From<String> for OrchestratorType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Kubernetes" => OrchestratorType::Kubernetes,
            "KubernetesCRD" => OrchestratorType::KubernetesCRD,
            "ServiceFabric" => OrchestratorType::ServiceFabric,
            "Batch" => OrchestratorType::Batch,
            "DBforPostgreSQL" => OrchestratorType::DBforPostgreSQL,
            "AzureFirstParty" => OrchestratorType::AzureFirstParty,
            "WebApps" => OrchestratorType::WebApps,
            _ => OrchestratorType::Unsupported(s),
        }
    }
}

impl From<OrchestratorType> for String {
    fn from(t: OrchestratorType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for OrchestratorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How NC goal state reaches the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChannelMode {
    /// Goal state is pushed over the HTTP API.
    #[default]
    Direct,
    /// Goal state is pulled from the cluster controller on demand.
    Managed,
    /// Goal state arrives through custom resources.
    CRD,
    AzureHost,
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelMode::Direct => "Direct",
            ChannelMode::Managed => "Managed",
            ChannelMode::CRD => "CRD",
            ChannelMode::AzureHost => "AzureHost",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetOrchestratorTypeRequest {
    #[serde(rename = "OrchestratorType", default)]
    pub orchestrator_type: OrchestratorType,
    #[serde(rename = "DncPartitionKey", default)]
    pub dnc_partition_key: String,
    #[serde(rename = "NodeID", default)]
    pub node_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orchestrator_families() {
        assert!(OrchestratorType::KubernetesCRD.is_crd());
        assert!(!OrchestratorType::KubernetesCRD.indexes_pod_context());
        assert!(OrchestratorType::Batch.indexes_pod_context());
        assert!(!OrchestratorType::default().is_supported());
    }

    #[test]
    fn test_set_orchestrator_request() {
        let json = r#"{"OrchestratorType":"KubernetesCRD","DncPartitionKey":"pk","NodeID":"node-1"}"#;
        let req: SetOrchestratorTypeRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.orchestrator_type, OrchestratorType::KubernetesCRD);
        assert_eq!(req.node_id, "node-1");

        let req: SetOrchestratorTypeRequest =
            serde_json::from_str(r#"{"OrchestratorType":"Mesos"}"#).unwrap();
        assert_eq!(req.orchestrator_type.as_str(), "Mesos");
        assert!(!req.orchestrator_type.is_supported());
    }
}
