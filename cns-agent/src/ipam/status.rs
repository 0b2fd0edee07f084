//! Per-IP record of the pool.

use chrono::{DateTime, Utc};
use cns_types::IPConfigState;
use serde::{Deserialize, Serialize};

use super::PodInfo;

/// Hook called on every state change with `(previous, next)`.
///
/// Runs synchronously while the pool is locked, so implementations must not
/// block.
pub trait StateTransitionMiddleware: Send + Sync {
    fn on_transition(&self, previous: IPConfigState, next: IPConfigState);
}

/// Middleware that ignores transitions.
pub struct NoopMiddleware;

impl StateTransitionMiddleware for NoopMiddleware {
    fn on_transition(&self, _previous: IPConfigState, _next: IPConfigState) {}
}

/// One secondary IP of the pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IPConfigurationStatus {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "NCID")]
    pub nc_id: String,
    #[serde(rename = "IPAddress")]
    pub ip_address: String,
    /// NC version at which this IP became (or will become) usable.
    #[serde(rename = "NCVersion", default)]
    pub nc_version: i64,
    #[serde(rename = "State")]
    state: IPConfigState,
    /// Present only while Assigned.
    #[serde(rename = "PodInfo", default, skip_serializing_if = "Option::is_none")]
    pub pod_info: Option<PodInfo>,
    #[serde(rename = "LastStateTransition")]
    last_state_transition: DateTime<Utc>,
}

impl IPConfigurationStatus {
    pub fn new(
        id: impl Into<String>,
        nc_id: impl Into<String>,
        ip_address: impl Into<String>,
        nc_version: i64,
        state: IPConfigState,
    ) -> Self {
        Self {
            id: id.into(),
            nc_id: nc_id.into(),
            ip_address: ip_address.into(),
            nc_version,
            state,
            pod_info: None,
            last_state_transition: Utc::now(),
        }
    }

    pub fn state(&self) -> IPConfigState {
        self.state
    }

    pub fn last_state_transition(&self) -> DateTime<Utc> {
        self.last_state_transition
    }

    /// Move to `next`, stamping the transition time and notifying `middleware`.
    pub fn set_state(&mut self, next: IPConfigState, middleware: &dyn StateTransitionMiddleware) {
        let previous = self.state;
        self.state = next;
        self.last_state_transition = Utc::now();
        middleware.on_transition(previous, next);
    }

    /// Whether this record is held by the pod with index key `pod_key`.
    pub fn is_held_by(&self, pod_key: &str) -> bool {
        self.state == IPConfigState::Assigned
            && self
                .pod_info
                .as_ref()
                .map(|p| p.key() == pod_key)
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(IPConfigState, IPConfigState)>>);

    impl StateTransitionMiddleware for Recorder {
        fn on_transition(&self, previous: IPConfigState, next: IPConfigState) {
            self.0.lock().unwrap().push((previous, next));
        }
    }

    #[test]
    fn test_set_state_notifies_and_stamps() {
        let recorder = Recorder::default();
        let mut status =
            IPConfigurationStatus::new("uuid-A", "nc1", "10.0.0.1", 1, IPConfigState::PendingProgramming);
        let before = status.last_state_transition();

        std::thread::sleep(std::time::Duration::from_millis(2));
        status.set_state(IPConfigState::Available, &recorder);

        assert_eq!(status.state(), IPConfigState::Available);
        assert!(status.last_state_transition() > before);
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![(IPConfigState::PendingProgramming, IPConfigState::Available)]
        );
    }

    #[test]
    fn test_serialized_shape() {
        let status = IPConfigurationStatus::new("uuid-A", "nc1", "10.0.0.1", 3, IPConfigState::Available);
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["State"], "Available");
        assert_eq!(value["NCVersion"], 3);
        assert!(value.get("PodInfo").is_none());

        let back: IPConfigurationStatus = serde_json::from_value(value).unwrap();
        assert_eq!(back, status);
    }
}
