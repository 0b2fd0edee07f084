//! IP address management: per-IP records and the node pool.

pub mod pool;
pub mod status;

pub use pool::{IpamPool, PoolCounts};
pub use status::{IPConfigurationStatus, NoopMiddleware, StateTransitionMiddleware};

use cns_types::{IPConfigRequest, IPConfigState, KubernetesPodInfo, ResponseCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity of a pod holding (or asking for) an IP.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PodInfo {
    #[serde(rename = "InfraContainerID", default)]
    pub infra_container_id: String,
    #[serde(rename = "PodInterfaceID", default)]
    pub pod_interface_id: String,
    #[serde(rename = "PodName", default)]
    pub pod_name: String,
    #[serde(rename = "PodNamespace", default)]
    pub pod_namespace: String,
}

impl PodInfo {
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            pod_name: name.to_string(),
            pod_namespace: namespace.to_string(),
            ..Default::default()
        }
    }

    /// Decode the pod identity out of an IP request.
    pub fn from_request(req: &IPConfigRequest) -> Result<Self, IpamError> {
        if req.orchestrator_context.is_null() {
            return Err(IpamError::EmptyOrchestratorContext);
        }
        let pod = KubernetesPodInfo::from_orchestrator_context(&req.orchestrator_context)
            .map_err(|e| IpamError::UnsupportedOrchestratorContext(e.to_string()))?;
        if pod.pod_name.is_empty() {
            return Err(IpamError::UnsupportedOrchestratorContext(
                "orchestrator context has no pod name".to_string(),
            ));
        }

        Ok(Self {
            infra_container_id: req.infra_container_id.clone(),
            pod_interface_id: req.pod_interface_id.clone(),
            pod_name: pod.pod_name,
            pod_namespace: pod.pod_namespace,
        })
    }

    /// Key of the pod index: the interface id when known, else `name:namespace`.
    pub fn key(&self) -> String {
        if self.pod_interface_id.is_empty() {
            format!("{}:{}", self.pod_name, self.pod_namespace)
        } else {
            self.pod_interface_id.clone()
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IpamError {
    #[error("Orchestrator context is empty")]
    EmptyOrchestratorContext,

    #[error("Unsupported orchestrator context: {0}")]
    UnsupportedOrchestratorContext(String),

    #[error("No available IP in the pool")]
    NoAvailableIp,

    #[error("Desired IP {ip} not found in the pool")]
    DesiredIpNotFound { ip: String },

    #[error("Desired IP {ip} is {state} and cannot be assigned")]
    DesiredIpUnavailable { ip: String, state: IPConfigState },

    #[error("Pod {pod_key} is indexed to missing IP {id}")]
    PodIndexCorrupted { pod_key: String, id: String },

    #[error("IP {0} is assigned to a pod")]
    IpAssigned(String),

    #[error("IP {0} not found in the pool")]
    IpNotFound(String),

    #[error("Network container {0} not found")]
    NcNotFound(String),
}

impl IpamError {
    pub fn code(&self) -> ResponseCode {
        match self {
            IpamError::EmptyOrchestratorContext => ResponseCode::EmptyOrchestratorContext,
            IpamError::UnsupportedOrchestratorContext(_) => {
                ResponseCode::UnsupportedOrchestratorContext
            }
            IpamError::NoAvailableIp
            | IpamError::DesiredIpNotFound { .. }
            | IpamError::DesiredIpUnavailable { .. } => ResponseCode::FailedToAllocateIPConfig,
            IpamError::PodIndexCorrupted { .. } => ResponseCode::UnexpectedError,
            IpamError::IpAssigned(_) => ResponseCode::InconsistentIPConfigState,
            IpamError::IpNotFound(_) => ResponseCode::NotFound,
            IpamError::NcNotFound(_) => ResponseCode::UnknownContainerID,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(context: serde_json::Value) -> IPConfigRequest {
        IPConfigRequest {
            orchestrator_context: context,
            infra_container_id: "abc".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_pod_info_from_request() {
        let pod = PodInfo::from_request(&request(serde_json::json!({
            "PodName": "p1",
            "PodNamespace": "ns1"
        })))
        .unwrap();
        assert_eq!(pod.key(), "p1:ns1");
        assert_eq!(pod.infra_container_id, "abc");
    }

    #[test]
    fn test_interface_id_is_preferred_key() {
        let mut req = request(serde_json::json!({"PodName": "p1", "PodNamespace": "ns1"}));
        req.pod_interface_id = "abc-eth0".to_string();
        assert_eq!(PodInfo::from_request(&req).unwrap().key(), "abc-eth0");
    }

    #[test]
    fn test_bad_contexts() {
        assert_eq!(
            PodInfo::from_request(&request(serde_json::Value::Null)),
            Err(IpamError::EmptyOrchestratorContext)
        );
        let err = PodInfo::from_request(&request(serde_json::json!([1, 2]))).unwrap_err();
        assert_eq!(err.code(), ResponseCode::UnsupportedOrchestratorContext);
        let err = PodInfo::from_request(&request(serde_json::json!({}))).unwrap_err();
        assert_eq!(err.code(), ResponseCode::UnsupportedOrchestratorContext);
    }
}
