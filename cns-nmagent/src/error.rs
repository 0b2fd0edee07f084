//! Error types for host agent calls.

use cns_types::ResponseCode;
use thiserror::Error;

/// Errors returned by an [`crate::NmAgentClient`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NmAgentError {
    /// HTTP 401, or HTTP 200 carrying an inner 401.
    #[error("Unauthorized by host agent: {0}")]
    Unauthorized(String),

    /// HTTP 500 or a transport failure.
    #[error("Host agent internal server error: {0}")]
    InternalServerError(String),

    /// Any other non-success outer or inner status.
    #[error("Host agent returned status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// The call did not complete before its deadline.
    #[error("Host agent call timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The body could not be decoded.
    #[error("Failed to decode host agent response: {0}")]
    Decode(String),

    /// Configuration (URL, client) is unusable.
    #[error("Invalid host agent request: {0}")]
    InvalidRequest(String),
}

impl NmAgentError {
    /// Return code surfaced to callers of the agent API.
    pub fn code(&self) -> ResponseCode {
        match self {
            NmAgentError::Unauthorized(_) => ResponseCode::StatusUnauthorized,
            NmAgentError::InternalServerError(_) => ResponseCode::NmAgentInternalServerError,
            NmAgentError::UnexpectedStatus { .. } | NmAgentError::Timeout(_) => {
                ResponseCode::CallToHostFailed
            }
            NmAgentError::Decode(_) => ResponseCode::UnexpectedError,
            NmAgentError::InvalidRequest(_) => ResponseCode::InvalidParameter,
        }
    }

    /// Upstream HTTP status, when one was observed.
    pub fn status(&self) -> Option<u16> {
        match self {
            NmAgentError::Unauthorized(_) => Some(401),
            NmAgentError::InternalServerError(_) => Some(500),
            NmAgentError::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for NmAgentError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            NmAgentError::Decode(e.to_string())
        } else {
            NmAgentError::InternalServerError(e.to_string())
        }
    }
}

/// Result type alias for host agent calls.
pub type Result<T> = std::result::Result<T, NmAgentError>;
