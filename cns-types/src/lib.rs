//! # CNS Types
//!
//! JSON wire contract of the Container Networking Service.
//!
//! Field names follow the PascalCase contract already spoken by the CNI
//! plugin and the cluster controller, so most fields carry an explicit
//! `#[serde(rename)]`. Every response embeds the [`Response`] envelope whose
//! [`ResponseCode`] is the outcome taxonomy.

pub mod codes;
pub mod ipam;
pub mod nc;
pub mod node;
pub mod orchestrator;
pub mod publish;

pub use codes::{ResponseCode, UnknownResponseCode};
pub use ipam::*;
pub use nc::*;
pub use node::*;
pub use orchestrator::*;
pub use publish::*;

use serde::{Deserialize, Serialize};

/// Name of the header mirroring the envelope return code on every response.
pub const RETURN_CODE_HEADER: &str = "Response-Return-Code";

/// Envelope carried by every response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "ReturnCode")]
    pub return_code: ResponseCode,
    #[serde(rename = "Message", default)]
    pub message: String,
}

impl Response {
    /// A successful envelope with an empty message.
    pub fn success() -> Self {
        Self::default()
    }

    pub fn new(return_code: ResponseCode, message: impl Into<String>) -> Self {
        Self {
            return_code,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.return_code == ResponseCode::Success
    }
}
