//! Per infra container endpoint state.
//!
//! Maps an infra container id to its pod and, per interface, the IPs
//! assigned to it. Persisted in its own store and only maintained when
//! `ManageEndpointState` is on.

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use tracing::{debug, warn};

use crate::ipam::PodInfo;
use crate::store::{KeyValueStore, KeyValueStoreExt, StoreError, ENDPOINTS_KEY};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IPInfo {
    #[serde(rename = "IPv4", default)]
    pub ipv4: Vec<String>,
    #[serde(rename = "IPv6", default)]
    pub ipv6: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInfo {
    #[serde(rename = "PodName", default)]
    pub pod_name: String,
    #[serde(rename = "PodNamespace", default)]
    pub pod_namespace: String,
    #[serde(rename = "IfnameToIPMap", default)]
    pub ifname_to_ip_map: BTreeMap<String, IPInfo>,
}

/// Infra container id to endpoint.
pub type EndpointMap = BTreeMap<String, EndpointInfo>;

/// Host-length CIDR of `ip`: /32 for IPv4, /128 for IPv6.
fn host_cidr(ip: &str) -> Option<(IpNetwork, bool)> {
    let addr: IpAddr = ip.parse().ok()?;
    let prefix = if addr.is_ipv4() { 32 } else { 128 };
    IpNetwork::new(addr, prefix).ok().map(|n| (n, addr.is_ipv4()))
}

/// Record `ip` on interface `ifname` of the pod's infra container.
///
/// Returns whether the map changed. Pods without an infra container id are
/// not tracked.
pub fn record_assignment(endpoints: &mut EndpointMap, pod: &PodInfo, ifname: &str, ip: &str) -> bool {
    if pod.infra_container_id.is_empty() {
        return false;
    }
    let Some((cidr, is_v4)) = host_cidr(ip) else {
        warn!(ip = %ip, "Not recording unparseable IP in endpoint state");
        return false;
    };
    let cidr = cidr.to_string();

    let endpoint = endpoints
        .entry(pod.infra_container_id.clone())
        .or_insert_with(|| EndpointInfo {
            pod_name: pod.pod_name.clone(),
            pod_namespace: pod.pod_namespace.clone(),
            ifname_to_ip_map: BTreeMap::new(),
        });
    let info = endpoint.ifname_to_ip_map.entry(ifname.to_string()).or_default();
    let list = if is_v4 { &mut info.ipv4 } else { &mut info.ipv6 };
    if list.contains(&cidr) {
        return false;
    }
    list.push(cidr);
    debug!(infra_container_id = %pod.infra_container_id, ifname = %ifname, ip = %ip, "Endpoint updated");
    true
}

/// Drop the endpoint of `infra_container_id`. Absence is not an error.
pub fn remove_endpoint(endpoints: &mut EndpointMap, infra_container_id: &str) -> bool {
    endpoints.remove(infra_container_id).is_some()
}

/// Load the endpoint map; a missing store is an empty map.
pub fn load(store: &dyn KeyValueStore) -> Result<EndpointMap, StoreError> {
    match store.read_typed::<EndpointMap>(ENDPOINTS_KEY) {
        Ok(map) => Ok(map),
        Err(StoreError::NotFound(_)) => Ok(EndpointMap::new()),
        Err(e) => Err(e),
    }
}

pub fn persist(store: &dyn KeyValueStore, endpoints: &EndpointMap) -> Result<(), StoreError> {
    store.write_typed(ENDPOINTS_KEY, endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn pod() -> PodInfo {
        PodInfo {
            infra_container_id: "abc".to_string(),
            ..PodInfo::new("p1", "ns1")
        }
    }

    #[test]
    fn test_record_dedups_and_splits_families() {
        let mut map = EndpointMap::new();
        assert!(record_assignment(&mut map, &pod(), "eth0", "10.0.0.1"));
        assert!(!record_assignment(&mut map, &pod(), "eth0", "10.0.0.1"));
        assert!(record_assignment(&mut map, &pod(), "eth0", "fd00::1"));

        let info = &map["abc"].ifname_to_ip_map["eth0"];
        assert_eq!(info.ipv4, vec!["10.0.0.1/32".to_string()]);
        assert_eq!(info.ipv6, vec!["fd00::1/128".to_string()]);
        assert_eq!(map["abc"].pod_name, "p1");
    }

    #[test]
    fn test_untracked_without_infra_container() {
        let mut map = EndpointMap::new();
        assert!(!record_assignment(&mut map, &PodInfo::new("p", "ns"), "eth0", "10.0.0.1"));
        assert!(map.is_empty());
    }

    #[test]
    fn test_persist_and_remove() {
        let store = MemoryStore::new();
        assert!(load(&store).unwrap().is_empty());

        let mut map = EndpointMap::new();
        record_assignment(&mut map, &pod(), "eth0", "10.0.0.1");
        persist(&store, &map).unwrap();
        assert_eq!(load(&store).unwrap(), map);

        assert!(remove_endpoint(&mut map, "abc"));
        assert!(!remove_endpoint(&mut map, "abc"));
    }
}
