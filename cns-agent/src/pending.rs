//! Bounded set of pods waiting for an IP.
//!
//! Only used to observe how long a pod waited between its first request and
//! the assignment. Allocation never depends on it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default capacity of the pending set.
pub const DEFAULT_CAPACITY: usize = 250;

pub struct PodPendingSet {
    entries: Mutex<HashMap<String, Instant>>,
    capacity: usize,
}

impl PodPendingSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::with_capacity(capacity)),
            capacity,
        }
    }

    /// Record `key` unless it is already present or the set is full.
    pub fn push(&self, key: &str) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        if entries.len() >= self.capacity || entries.contains_key(key) {
            return;
        }
        entries.insert(key.to_string(), Instant::now());
    }

    /// Remove `key`, returning how long it was pending (zero if absent).
    pub fn pop(&self, key: &str) -> Duration {
        self.entries
            .lock()
            .ok()
            .and_then(|mut entries| entries.remove(key))
            .map(|since| since.elapsed())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PodPendingSet {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
