//! # CNS Common
//!
//! Shared utilities for the CNS agent components.
//!
//! ## Logging
//!
//! ```rust,no_run
//! use cns_common::{init_logging, LogFormat};
//!
//! init_logging("info", LogFormat::Pretty).unwrap();
//! tracing::info!(nc_id = "nc-1", "Network container saved");
//! ```

pub mod logging;

pub use logging::{init_logging, init_logging_json, init_logging_pretty, LogFormat};
