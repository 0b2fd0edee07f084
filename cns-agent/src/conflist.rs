//! CNI conflist generation.
//!
//! The kubelet treats the node as network-ready once a conflist exists, so
//! it is only written after every NC has been programmed on the host.

use serde_json::json;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::info;

use crate::config::ConflistConfig;

pub trait ConflistGenerator: Send + Sync {
    fn generate(&self) -> io::Result<()>;
}

/// Writes the conflist to a file, replacing any previous one atomically.
pub struct FileConflistGenerator {
    path: PathBuf,
    network_name: String,
    plugin_type: String,
}

impl FileConflistGenerator {
    pub fn new(config: &ConflistConfig) -> Self {
        Self {
            path: config.path.clone(),
            network_name: config.network_name.clone(),
            plugin_type: config.plugin_type.clone(),
        }
    }

    pub fn render(&self) -> serde_json::Value {
        json!({
            "cniVersion": "0.3.0",
            "name": self.network_name,
            "plugins": [
                {
                    "type": self.plugin_type,
                    "mode": "transparent",
                    "executionMode": "v4swift",
                    "ipsToRouteViaHost": ["169.254.20.10"],
                    "ipam": { "type": "azure-cns" },
                    "dns": {},
                    "runtimeConfig": { "dns": {} },
                    "windowsSettings": {}
                },
                {
                    "type": "portmap",
                    "capabilities": { "portMappings": true },
                    "snat": true
                }
            ]
        })
    }
}

impl ConflistGenerator for FileConflistGenerator {
    fn generate(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_vec_pretty(&self.render()).map_err(io::Error::other)?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;

        info!(path = %self.path.display(), "CNI conflist written");
        Ok(())
    }
}
