//! Host agent response bodies.
//!
//! Every body carries an inner `httpStatusCode` string next to its payload.
//! The outer HTTP status can be 200 while the inner one reports a failure.

use serde::{Deserialize, Serialize};

/// Name of the supported-API entry advertising the home AZ call.
pub const GET_HOME_AZ_API: &str = "GetHomeAz";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedApisResponse {
    #[serde(default)]
    pub http_status_code: String,
    #[serde(default)]
    pub supported_apis: Vec<String>,
}

/// Version of one NC as programmed on the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NcVersion {
    #[serde(default)]
    pub network_container_id: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NcVersionResponse {
    #[serde(default)]
    pub http_status_code: String,
    #[serde(flatten)]
    pub nc: NcVersion,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NcVersionListResponse {
    #[serde(default)]
    pub http_status_code: String,
    #[serde(default)]
    pub network_containers: Vec<NcVersion>,
}

impl NcVersionListResponse {
    /// Look up the host version of `nc_id`.
    pub fn version_of(&self, nc_id: &str) -> Option<&str> {
        self.network_containers
            .iter()
            .find(|nc| nc.network_container_id == nc_id)
            .map(|nc| nc.version.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeAzBody {
    #[serde(rename = "httpStatusCode", default)]
    pub http_status_code: String,
    #[serde(rename = "HomeAz", default)]
    pub home_az: u32,
}

/// Raw upstream answer of a pass-through call (join, put, delete).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostResponse {
    pub status: u16,
    pub body: String,
}
