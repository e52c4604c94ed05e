//! Daemon configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Daemon configuration, read from `PULSEWATCH_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Name reported in structured logs and alert labels
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// API server port for health, metrics and control
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Persisted settings document
    #[serde(default = "default_settings_path")]
    pub settings_path: PathBuf,

    /// Directory holding `<mode>-endpoints.json` files
    #[serde(default = "default_catalog_dir")]
    pub catalog_dir: PathBuf,

    /// Alertmanager-compatible webhook; alerts are only logged when unset
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// `;`-separated UNC paths of profile containers
    #[serde(default)]
    pub profile_paths: String,

    /// `;`-separated UNC paths of other storage containers
    #[serde(default)]
    pub container_paths: String,
}

fn default_node_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_settings_path() -> PathBuf {
    PathBuf::from("settings.json")
}

fn default_catalog_dir() -> PathBuf {
    PathBuf::from("endpoints")
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            api_port: default_api_port(),
            settings_path: default_settings_path(),
            catalog_dir: default_catalog_dir(),
            webhook_url: None,
            profile_paths: String::new(),
            container_paths: String::new(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("PULSEWATCH").try_parsing(true))
            .build()?;

        let mut loaded: MonitorConfig = config
            .try_deserialize()
            .context("Invalid PULSEWATCH_* configuration")?;
        if loaded.webhook_url.as_deref().map(str::trim) == Some("") {
            loaded.webhook_url = None;
        }
        Ok(loaded)
    }
}
