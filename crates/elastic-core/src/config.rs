//! Plugin settings parser (`elastic.toml`).

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Platform, StopPolicy};

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render settings: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid setting {0}: {1}")]
    Invalid(&'static str, &'static str),
}

fn default_plugin_id() -> String {
    "elastic-agent.ecs".to_string()
}

fn default_reconcile_interval() -> u64 {
    60
}

/// Cluster-wide settings shared by every profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSettings {
    /// URL agents use to reach the server.
    pub go_server_url: String,
    pub cluster_name: String,
    /// Written into the `created-by` label and the agent environment.
    #[serde(default = "default_plugin_id")]
    pub plugin_id: String,
    #[serde(default)]
    pub linux_stop_policy: StopPolicy,
    #[serde(default)]
    pub windows_stop_policy: StopPolicy,
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    /// Seconds between reconciliation passes.
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
    /// Extra environment passed to every agent container.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub log: Option<LogConfiguration>,
}

/// Container log driver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfiguration {
    pub driver: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl PluginSettings {
    pub fn new(go_server_url: impl Into<String>, cluster_name: impl Into<String>) -> Self {
        Self {
            go_server_url: go_server_url.into(),
            cluster_name: cluster_name.into(),
            plugin_id: default_plugin_id(),
            linux_stop_policy: StopPolicy::default(),
            windows_stop_policy: StopPolicy::default(),
            subnet_ids: Vec::new(),
            security_group_ids: Vec::new(),
            reconcile_interval_secs: default_reconcile_interval(),
            environment: BTreeMap::new(),
            log: None,
        }
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let settings: PluginSettings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.go_server_url.trim().is_empty() {
            return Err(ConfigError::Missing("go_server_url"));
        }
        if self.cluster_name.trim().is_empty() {
            return Err(ConfigError::Missing("cluster_name"));
        }
        if self.reconcile_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "reconcile_interval_secs",
                "must be at least one second",
            ));
        }
        Ok(())
    }

    /// How often the reconcile loop refreshes its task view.
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    /// LINUX uses the linux policy; everything else the windows one.
    pub fn stop_policy_for(&self, platform: Platform) -> StopPolicy {
        match platform {
            Platform::Linux => self.linux_stop_policy,
            _ => self.windows_stop_policy,
        }
    }
}
