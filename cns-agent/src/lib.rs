//! # CNS Agent
//!
//! Node-local Container Networking Service. Hands out pod IPs from the
//! secondary IP pool of the node's network containers, keeps NC goal state
//! in sync with the host agent and the cluster controller, and serves the
//! CNI-facing HTTP API.
//!
//! ```text
//!   CNI plugin / cluster controller
//!                 │ HTTP (axum)
//!                 ▼
//!   ┌───────────────────────────┐     ┌──────────────┐
//!   │        RestService        │────▶│  JSON store  │
//!   │ registry · ipam · endpoint│     └──────────────┘
//!   └─────┬───────────────┬─────┘
//!         │               │
//!         ▼               ▼
//!   host agent (NMA)   cluster controller (DNC)
//! ```
//!
//! Background loops (host version reconciler, snapshot emitter, home AZ
//! monitor) run on the same runtime and stop on a shared cancellation token.

pub mod cli;
pub mod config;
pub mod conflist;
pub mod dnc;
pub mod endpoint;
pub mod home_az;
pub mod http_server;
pub mod ipam;
pub mod metrics;
pub mod named_lock;
pub mod netplugin;
pub mod pending;
pub mod publish;
pub mod reboot;
pub mod reconciler;
pub mod registry;
pub mod server;
pub mod service;
pub mod snat;
pub mod state;
pub mod store;

pub use service::{RestService, ServiceDeps, ServiceError, ServiceOptions};
