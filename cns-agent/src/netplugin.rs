//! Attach and detach containers through a CNI network plugin.

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, instrument};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetPluginError {
    #[error("Failed to read plugin config {path}: {reason}")]
    Config { path: String, reason: String },

    #[error("Plugin {plugin} {command} failed: {reason}")]
    Exec {
        plugin: String,
        command: String,
        reason: String,
    },
}

/// Identity of the container handed to the plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginContext {
    pub container_id: String,
    pub netns: String,
    pub ifname: String,
    pub pod_name: String,
    pub pod_namespace: String,
}

impl PluginContext {
    /// `CNI_ARGS` value for the pod.
    pub fn cni_args(&self) -> String {
        format!(
            "IgnoreUnknown=1;K8S_POD_NAMESPACE={};K8S_POD_NAME={};K8S_POD_INFRA_CONTAINER_ID={}",
            self.pod_namespace, self.pod_name, self.container_id
        )
    }
}

#[async_trait]
pub trait NetPlugin: Send + Sync {
    async fn add(&self, ctx: &PluginContext) -> Result<(), NetPluginError>;
    async fn delete(&self, ctx: &PluginContext) -> Result<(), NetPluginError>;
}

/// Runs the CNI binary named by the network configuration file.
pub struct CniNetPlugin {
    plugin_dir: PathBuf,
    config_file: PathBuf,
}

impl CniNetPlugin {
    pub fn new(plugin_dir: impl Into<PathBuf>, config_file: impl Into<PathBuf>) -> Self {
        Self {
            plugin_dir: plugin_dir.into(),
            config_file: config_file.into(),
        }
    }

    /// Load the network config and resolve the plugin it names.
    ///
    /// A conflist is reduced to its first plugin carrying the list's name
    /// and CNI version.
    async fn load_config(&self) -> Result<(String, Value), NetPluginError> {
        let config_error = |reason: String| NetPluginError::Config {
            path: self.config_file.display().to_string(),
            reason,
        };

        let content = tokio::fs::read_to_string(&self.config_file)
            .await
            .map_err(|e| config_error(e.to_string()))?;
        let config: Value = serde_json::from_str(&content).map_err(|e| config_error(e.to_string()))?;

        let mut plugin = match config.get("plugins").and_then(Value::as_array) {
            Some(plugins) => {
                let mut first = plugins
                    .first()
                    .cloned()
                    .ok_or_else(|| config_error("conflist has no plugins".to_string()))?;
                if let Some(obj) = first.as_object_mut() {
                    for key in ["name", "cniVersion"] {
                        if let Some(v) = config.get(key) {
                            obj.insert(key.to_string(), v.clone());
                        }
                    }
                }
                first
            }
            None => config,
        };

        let plugin_type = plugin
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| config_error("plugin config has no type".to_string()))?;
        if let Some(obj) = plugin.as_object_mut() {
            obj.entry("name").or_insert_with(|| Value::String("cns".to_string()));
        }
        Ok((plugin_type, plugin))
    }

    async fn exec(&self, command: &str, ctx: &PluginContext) -> Result<(), NetPluginError> {
        let (plugin_type, config) = self.load_config().await?;
        let binary = self.plugin_dir.join(&plugin_type);
        let exec_error = |reason: String| NetPluginError::Exec {
            plugin: plugin_type.clone(),
            command: command.to_string(),
            reason,
        };

        let mut child = Command::new(&binary)
            .env("CNI_COMMAND", command)
            .env("CNI_CONTAINERID", &ctx.container_id)
            .env("CNI_NETNS", &ctx.netns)
            .env("CNI_IFNAME", &ctx.ifname)
            .env("CNI_PATH", &self.plugin_dir)
            .env("CNI_ARGS", ctx.cni_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| exec_error(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(config.to_string().as_bytes())
                .await
                .map_err(|e| exec_error(e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| exec_error(e.to_string()))?;
        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(exec_error(format!("{} {}", stdout.trim(), stderr.trim())));
        }
        debug!(plugin = %plugin_type, command, "Plugin completed");
        Ok(())
    }
}

#[async_trait]
impl NetPlugin for CniNetPlugin {
    #[instrument(skip(self), fields(container_id = %ctx.container_id))]
    async fn add(&self, ctx: &PluginContext) -> Result<(), NetPluginError> {
        self.exec("ADD", ctx).await?;
        info!("Container attached to network");
        Ok(())
    }

    #[instrument(skip(self), fields(container_id = %ctx.container_id))]
    async fn delete(&self, ctx: &PluginContext) -> Result<(), NetPluginError> {
        self.exec("DEL", ctx).await?;
        info!("Container detached from network");
        Ok(())
    }
}

/// Plugin that records calls as `(command, container id)`.
#[derive(Default)]
pub struct RecordingNetPlugin {
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingNetPlugin {
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, command: &str, ctx: &PluginContext) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((command.to_string(), ctx.container_id.clone()));
        }
    }
}

#[async_trait]
impl NetPlugin for RecordingNetPlugin {
    async fn add(&self, ctx: &PluginContext) -> Result<(), NetPluginError> {
        self.record("ADD", ctx);
        Ok(())
    }

    async fn delete(&self, ctx: &PluginContext) -> Result<(), NetPluginError> {
        self.record("DEL", ctx);
        Ok(())
    }
}
