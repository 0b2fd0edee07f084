//! Background reconciliation against the host agent and the cluster
//! controller.
//!
//! Each loop owns an `Arc<RestService>` and stops when its
//! `CancellationToken` fires.

pub mod cluster_sync;
pub mod host_version;
pub mod snapshot;

pub use host_version::{HostVersionReconciler, ReconcileError};
pub use snapshot::SnapshotEmitter;
