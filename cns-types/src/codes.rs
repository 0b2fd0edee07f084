//! Return-code taxonomy.
//!
//! Codes are stable integers on the wire. Gaps in the numbering are codes
//! retired by earlier releases and must not be reused.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Error returned when an integer does not name a known [`ResponseCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown response code: {0}")]
pub struct UnknownResponseCode(pub i32);

macro_rules! response_codes {
    ($($(#[$meta:meta])* $name:ident = $value:literal,)+) => {
        /// Outcome of every request, carried in the [`crate::Response`] envelope.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub enum ResponseCode {
            #[default]
            $($(#[$meta])* $name = $value,)+
        }

        impl ResponseCode {
            /// All known codes, in numeric order.
            pub const ALL: &'static [ResponseCode] = &[$(ResponseCode::$name,)+];

            /// Identifier string used in logs and metric labels.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(ResponseCode::$name => stringify!($name),)+
                }
            }
        }

        impl TryFrom<i32> for ResponseCode {
            type Error = UnknownResponseCode;

            fn try_from(value: i32) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(ResponseCode::$name),)+
                    other => Err(UnknownResponseCode(other)),
                }
            }
        }
    };
}

response_codes! {
    Success = 0,
    UnsupportedNetworkType = 1,
    InvalidParameter = 2,
    UnsupportedEnvironment = 3,
    UnreachableHost = 4,
    ReservationNotFound = 5,
    MalformedSubnet = 8,
    UnreachableDockerDaemon = 9,
    UnspecifiedNetworkName = 10,
    NotFound = 14,
    AddressUnavailable = 15,
    NetworkContainerNotSpecified = 16,
    CallToHostFailed = 17,
    UnknownContainerID = 18,
    UnsupportedOrchestratorType = 19,
    DockerContainerNotSpecified = 20,
    UnsupportedVerb = 21,
    UnsupportedNetworkContainerType = 22,
    InvalidRequest = 23,
    NetworkJoinFailed = 24,
    NetworkContainerPublishFailed = 25,
    NetworkContainerUnpublishFailed = 26,
    InvalidPrimaryIPConfig = 27,
    PrimaryCANotSame = 28,
    InconsistentIPConfigState = 29,
    InvalidSecondaryIPConfig = 30,
    NetworkContainerVfpProgramPending = 31,
    FailedToAllocateIPConfig = 32,
    EmptyOrchestratorContext = 33,
    UnsupportedOrchestratorContext = 34,
    NetworkContainerVfpProgramComplete = 35,
    NetworkContainerVfpProgramCheckSkipped = 36,
    NmAgentSupportedApisError = 37,
    UnsupportedNCVersion = 38,
    FailedToRunIPTableCmd = 39,
    NilEndpointStateStore = 40,
    NmAgentInternalServerError = 41,
    StatusUnauthorized = 42,
    UnsupportedNotification = 43,
    UnexpectedError = 99,
}

impl ResponseCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ResponseCode::Success
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ResponseCode> for i32 {
    fn from(code: ResponseCode) -> Self {
        code.as_i32()
    }
}

impl Serialize for ResponseCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.as_i32())
    }
}

impl<'de> Deserialize<'de> for ResponseCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = i32::deserialize(deserializer)?;
        ResponseCode::try_from(value).map_err(serde::de::Error::custom)
    }
}
