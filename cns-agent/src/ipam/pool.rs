//! The node IP pool.
//!
//! Records are keyed by IP UUID. The pod index maps a pod key to the UUID it
//! holds and is kept as the exact inverse of `PodInfo` on Assigned records.
//! The pool is plain data; the caller holds the service lock around every
//! call and persists afterwards.

use cns_types::{IPConfigState, SecondaryIPConfig};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::status::{IPConfigurationStatus, NoopMiddleware, StateTransitionMiddleware};
use super::{IpamError, PodInfo};

/// Number of IPs per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolCounts {
    pub available: usize,
    pub assigned: usize,
    pub pending_release: usize,
    pub pending_programming: usize,
}

impl PoolCounts {
    pub fn total(&self) -> usize {
        self.available + self.assigned + self.pending_release + self.pending_programming
    }
}

pub struct IpamPool {
    configs: BTreeMap<String, IPConfigurationStatus>,
    pod_index: BTreeMap<String, String>,
    middleware: Arc<dyn StateTransitionMiddleware>,
}

impl IpamPool {
    pub fn new(middleware: Arc<dyn StateTransitionMiddleware>) -> Self {
        Self {
            configs: BTreeMap::new(),
            pod_index: BTreeMap::new(),
            middleware,
        }
    }

    /// Rebuild a pool from persisted records.
    ///
    /// The pod index is re-derived from the Assigned records; a persisted
    /// index that disagrees is logged and replaced.
    pub fn from_parts(
        configs: BTreeMap<String, IPConfigurationStatus>,
        persisted_index: &BTreeMap<String, String>,
        middleware: Arc<dyn StateTransitionMiddleware>,
    ) -> Self {
        let mut pod_index = BTreeMap::new();
        for (id, status) in &configs {
            if status.state() != IPConfigState::Assigned {
                continue;
            }
            if let Some(pod) = &status.pod_info {
                pod_index.insert(pod.key(), id.clone());
            }
        }
        if &pod_index != persisted_index {
            warn!(
                persisted = persisted_index.len(),
                derived = pod_index.len(),
                "Persisted pod index disagrees with assigned IPs, rebuilt"
            );
        }

        Self {
            configs,
            pod_index,
            middleware,
        }
    }

    pub fn configs(&self) -> &BTreeMap<String, IPConfigurationStatus> {
        &self.configs
    }

    pub fn pod_index(&self) -> &BTreeMap<String, String> {
        &self.pod_index
    }

    pub fn get(&self, id: &str) -> Option<&IPConfigurationStatus> {
        self.configs.get(id)
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    // ------------------------------------------------------------------
    // Allocation
    // ------------------------------------------------------------------

    /// The record currently held by `pod`, if any.
    ///
    /// An index entry pointing at a missing record is a corruption error.
    pub fn existing_ip_config(&self, pod: &PodInfo) -> Result<Option<&IPConfigurationStatus>, IpamError> {
        let key = pod.key();
        match self.pod_index.get(&key) {
            None => Ok(None),
            Some(id) => match self.configs.get(id) {
                Some(status) => Ok(Some(status)),
                None => Err(IpamError::PodIndexCorrupted {
                    pod_key: key,
                    id: id.clone(),
                }),
            },
        }
    }

    /// Allocate an IP for `pod`, returning the Assigned record.
    ///
    /// A pod that already holds an IP gets the same record back. If the
    /// index points at a vanished record the stale entry is dropped and the
    /// request is served as a fresh allocation.
    pub fn request_ip_config(
        &mut self,
        pod: &PodInfo,
        desired_ip: Option<&str>,
    ) -> Result<IPConfigurationStatus, IpamError> {
        match self.existing_ip_config(pod) {
            Ok(Some(status)) => return Ok(status.clone()),
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Dropping stale pod index entry");
                self.pod_index.remove(&pod.key());
            }
        }

        match desired_ip.filter(|ip| !ip.is_empty()) {
            Some(ip) => self.assign_desired_ip_config(pod, ip),
            None => self.assign_any_available_ip_config(pod),
        }
    }

    /// Assign the IP whose address is `desired_ip` to `pod`.
    pub fn assign_desired_ip_config(
        &mut self,
        pod: &PodInfo,
        desired_ip: &str,
    ) -> Result<IPConfigurationStatus, IpamError> {
        let pod_key = pod.key();
        let (id, state, held) = self
            .configs
            .values()
            .find(|s| s.ip_address == desired_ip)
            .map(|s| (s.id.clone(), s.state(), s.is_held_by(&pod_key)))
            .ok_or_else(|| IpamError::DesiredIpNotFound {
                ip: desired_ip.to_string(),
            })?;

        match state {
            IPConfigState::Assigned if held => self
                .configs
                .get(&id)
                .cloned()
                .ok_or(IpamError::IpNotFound(id)),
            IPConfigState::Available | IPConfigState::PendingProgramming => self.assign(&id, pod),
            state => Err(IpamError::DesiredIpUnavailable {
                ip: desired_ip.to_string(),
                state,
            }),
        }
    }

    /// Assign any Available IP to `pod`.
    pub fn assign_any_available_ip_config(
        &mut self,
        pod: &PodInfo,
    ) -> Result<IPConfigurationStatus, IpamError> {
        let id = self
            .configs
            .values()
            .find(|s| s.state() == IPConfigState::Available)
            .map(|s| s.id.clone())
            .ok_or(IpamError::NoAvailableIp)?;
        self.assign(&id, pod)
    }

    fn assign(&mut self, id: &str, pod: &PodInfo) -> Result<IPConfigurationStatus, IpamError> {
        let status = self
            .configs
            .get_mut(id)
            .ok_or_else(|| IpamError::IpNotFound(id.to_string()))?;
        status.set_state(IPConfigState::Assigned, self.middleware.as_ref());
        status.pod_info = Some(pod.clone());
        self.pod_index.insert(pod.key(), id.to_string());

        debug!(ip_id = %id, ip = %status.ip_address, pod = %pod.key(), "IP assigned");
        Ok(status.clone())
    }

    /// Return the IP held by `pod` to Available.
    ///
    /// A pod without an allocation is a no-op and yields `None`.
    pub fn release_ip_config(&mut self, pod: &PodInfo) -> Result<Option<IPConfigurationStatus>, IpamError> {
        let key = pod.key();
        let Some(id) = self.pod_index.get(&key).cloned() else {
            return Ok(None);
        };
        let status = self
            .configs
            .get_mut(&id)
            .ok_or_else(|| IpamError::PodIndexCorrupted {
                pod_key: key.clone(),
                id: id.clone(),
            })?;

        let released = status.clone();
        status.set_state(IPConfigState::Available, self.middleware.as_ref());
        status.pod_info = None;
        self.pod_index.remove(&key);

        debug!(ip_id = %id, pod = %key, "IP released");
        Ok(Some(released))
    }

    // ------------------------------------------------------------------
    // Pending release
    // ------------------------------------------------------------------

    /// Move up to `n` IPs to PendingRelease, PendingProgramming ones first.
    pub fn mark_ip_as_pending_release(&mut self, n: usize) -> Vec<IPConfigurationStatus> {
        let mut ids: Vec<String> = self
            .configs
            .values()
            .filter(|s| s.state() == IPConfigState::PendingProgramming)
            .map(|s| s.id.clone())
            .take(n)
            .collect();
        if ids.len() < n {
            let remaining = n - ids.len();
            ids.extend(
                self.configs
                    .values()
                    .filter(|s| s.state() == IPConfigState::Available)
                    .map(|s| s.id.clone())
                    .take(remaining),
            );
        }

        let mut moved = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(status) = self.configs.get_mut(&id) {
                status.set_state(IPConfigState::PendingRelease, self.middleware.as_ref());
                moved.push(status.clone());
            }
        }
        moved
    }

    /// Mark the given UUIDs PendingRelease.
    ///
    /// Assigned or unknown UUIDs are skipped and reported through the first
    /// error; every other UUID is still marked.
    pub fn mark_existing_ips_as_pending_release(&mut self, ids: &[String]) -> Result<(), IpamError> {
        let mut first_error = None;
        for id in ids {
            match self.configs.get_mut(id) {
                None => {
                    first_error.get_or_insert(IpamError::IpNotFound(id.clone()));
                }
                Some(status) if status.state() == IPConfigState::Assigned => {
                    first_error.get_or_insert(IpamError::IpAssigned(id.clone()));
                }
                Some(status) => {
                    if status.state() != IPConfigState::PendingRelease {
                        status.set_state(IPConfigState::PendingRelease, self.middleware.as_ref());
                    }
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Promote PendingProgramming IPs of `nc_id` programmed at or below
    /// `new_host_version` to Available. Returns the number promoted.
    ///
    /// The caller must hold the service lock.
    pub fn mark_ips_as_available_untransacted(&mut self, nc_id: &str, new_host_version: i64) -> usize {
        let mut promoted = 0;
        for status in self.configs.values_mut() {
            if status.nc_id != nc_id
                || status.state() != IPConfigState::PendingProgramming
                || status.nc_version > new_host_version
            {
                continue;
            }
            status.set_state(IPConfigState::Available, self.middleware.as_ref());
            status.nc_version = new_host_version;
            promoted += 1;
        }
        promoted
    }

    // ------------------------------------------------------------------
    // Goal state
    // ------------------------------------------------------------------

    /// Apply an NC's secondary IP set to the pool.
    ///
    /// UUIDs of `nc_id` missing from `secondary_ips` are removed, and the
    /// whole call is rejected before any change if one of them is Assigned.
    /// New UUIDs are inserted PendingProgramming when their version is ahead
    /// of `host_version` (and `gate` is set), else Available. Existing UUIDs
    /// keep their state and recorded version.
    pub fn apply_goal_state(
        &mut self,
        nc_id: &str,
        secondary_ips: &BTreeMap<String, SecondaryIPConfig>,
        host_version: i64,
        gate: bool,
    ) -> Result<(), IpamError> {
        let removed: Vec<String> = self
            .configs
            .values()
            .filter(|s| s.nc_id == nc_id && !secondary_ips.contains_key(&s.id))
            .map(|s| s.id.clone())
            .collect();

        if let Some(assigned) = removed
            .iter()
            .find(|id| self.configs.get(*id).map(|s| s.state()) == Some(IPConfigState::Assigned))
        {
            return Err(IpamError::IpAssigned(assigned.clone()));
        }

        for id in &removed {
            self.configs.remove(id);
        }

        let mut added = 0;
        for (id, ip) in secondary_ips {
            if self.configs.contains_key(id) {
                continue;
            }
            let state = if gate && ip.nc_version > host_version {
                IPConfigState::PendingProgramming
            } else {
                IPConfigState::Available
            };
            self.configs.insert(
                id.clone(),
                IPConfigurationStatus::new(id.clone(), nc_id, ip.ip_address.clone(), ip.nc_version, state),
            );
            added += 1;
        }

        debug!(nc_id = %nc_id, added, removed = removed.len(), "Applied secondary IP goal state");
        Ok(())
    }

    /// Insert a record.
    pub fn add_ip(&mut self, status: IPConfigurationStatus) {
        if status.state() == IPConfigState::Assigned {
            if let Some(pod) = &status.pod_info {
                self.pod_index.insert(pod.key(), status.id.clone());
            }
        }
        self.configs.insert(status.id.clone(), status);
    }

    /// Remove a record. Assigned records cannot be removed.
    pub fn remove_ip(&mut self, id: &str) -> Result<IPConfigurationStatus, IpamError> {
        match self.configs.get(id) {
            None => Err(IpamError::IpNotFound(id.to_string())),
            Some(s) if s.state() == IPConfigState::Assigned => Err(IpamError::IpAssigned(id.to_string())),
            Some(_) => self
                .configs
                .remove(id)
                .ok_or_else(|| IpamError::IpNotFound(id.to_string())),
        }
    }

    /// Remove every non-Assigned record of `nc_id`. Returns the UUIDs left behind.
    pub fn remove_nc_ips(&mut self, nc_id: &str) -> Vec<String> {
        let mut kept = Vec::new();
        self.configs.retain(|id, s| {
            if s.nc_id != nc_id {
                return true;
            }
            if s.state() == IPConfigState::Assigned {
                kept.push(id.clone());
                return true;
            }
            false
        });
        kept
    }

    /// Remove every non-Assigned record whose NC fails `owned`. Returns the
    /// removed UUIDs.
    pub fn remove_unowned_ips(&mut self, owned: impl Fn(&str) -> bool) -> Vec<String> {
        let mut removed = Vec::new();
        self.configs.retain(|id, s| {
            if s.state() == IPConfigState::Assigned || owned(&s.nc_id) {
                return true;
            }
            removed.push(id.clone());
            false
        });
        removed
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// Records in any of `states`, in UUID order.
    pub fn filter_by_state(&self, states: &[IPConfigState]) -> Vec<IPConfigurationStatus> {
        self.configs
            .values()
            .filter(|s| states.contains(&s.state()))
            .cloned()
            .collect()
    }

    pub fn counts(&self) -> PoolCounts {
        let mut counts = PoolCounts::default();
        for status in self.configs.values() {
            match status.state() {
                IPConfigState::Available => counts.available += 1,
                IPConfigState::Assigned => counts.assigned += 1,
                IPConfigState::PendingRelease => counts.pending_release += 1,
                IPConfigState::PendingProgramming => counts.pending_programming += 1,
            }
        }
        counts
    }
}

impl Default for IpamPool {
    fn default() -> Self {
        Self::new(Arc::new(NoopMiddleware))
    }
}
