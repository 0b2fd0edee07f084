//! Detect whether the host rebooted since the state was last written.

use chrono::{DateTime, Utc};
use sysinfo::System;

use crate::store::KeyValueStore;

/// Host boot time, `None` when the platform does not report one.
pub fn host_boot_time() -> Option<DateTime<Utc>> {
    let secs = System::boot_time();
    if secs == 0 {
        return None;
    }
    DateTime::from_timestamp(secs as i64, 0)
}

/// When the state was last written: the stamped timestamp, else the store's
/// modification time.
pub fn last_write_time(stamped: Option<DateTime<Utc>>, store: &dyn KeyValueStore) -> Option<DateTime<Utc>> {
    stamped.or_else(|| store.modification_time().ok().map(DateTime::<Utc>::from))
}

/// Whether state written at `last_write` predates a boot at `boot_time`.
pub fn rebooted_since(last_write: Option<DateTime<Utc>>, boot_time: Option<DateTime<Utc>>) -> bool {
    match (last_write, boot_time) {
        (Some(written), Some(booted)) => written < booted,
        _ => false,
    }
}
