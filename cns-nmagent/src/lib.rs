//! # CNS NMAgent
//!
//! Client for the node-local host networking agent (NMA), the component
//! that programs the dataplane and reports which NC versions it has applied.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │      NmAgentClient trait     │
//! └──────────────┬───────────────┘
//!        ┌───────┴────────┐
//!        ▼                ▼
//! HttpNmAgentClient   MockNmAgent
//!   (reqwest)         (in memory)
//! ```
//!
//! Host agent bodies carry an inner status code next to the HTTP status;
//! [`check_status`] folds both into a single [`NmAgentError`].

pub mod client;
pub mod error;
pub mod mock;
pub mod types;

pub use client::{
    check_status, nc_version_url, ClientConfig, HttpNmAgentClient, NmAgentClient, DEFAULT_TIMEOUT,
};
pub use error::{NmAgentError, Result};
pub use mock::MockNmAgent;
pub use types::*;
