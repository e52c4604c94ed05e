//! Persisted settings and settings-file watching

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::catalog::CustomEndpoint;
use crate::error::EngineError;
use crate::models::{Config, Sample, TargetOverride};

pub const SETTINGS_VERSION: u32 = 1;

fn default_version() -> u32 {
    SETTINGS_VERSION
}

/// On-disk settings document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsFile {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub config: Config,
    #[serde(default)]
    pub custom_endpoints: Vec<CustomEndpoint>,
    #[serde(default)]
    pub target_overrides: HashMap<String, TargetOverride>,
    #[serde(default)]
    pub storage_muted: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub history: HashMap<String, Vec<Sample>>,
}

impl Default for SettingsFile {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            config: Config::default(),
            custom_endpoints: Vec::new(),
            target_overrides: HashMap::new(),
            storage_muted: Vec::new(),
            history: HashMap::new(),
        }
    }
}

impl SettingsFile {
    /// Load settings; a missing file yields defaults
    pub async fn load(path: &Path) -> Result<Self> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Settings file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };

        let settings: SettingsFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        settings
            .config
            .validate()
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        Ok(settings)
    }

    /// Check a document before adopting it
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.version > SETTINGS_VERSION {
            return Err(EngineError::InvalidConfig(format!(
                "unsupported settings version {}",
                self.version
            )));
        }
        self.config.validate()?;
        for endpoint in &self.custom_endpoints {
            endpoint.to_target()?;
        }
        Ok(())
    }

    /// Write settings by replacing the file in one rename
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        let tmp = temp_path(path);
        tokio::fs::write(&tmp, content)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("settings.json"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Watches the settings file and forwards change notifications
pub struct SettingsWatcher {
    path: PathBuf,
}

/// Keeps the watcher alive; dropping it stops watching
pub struct SettingsWatchHandle {
    _watcher: RecommendedWatcher,
    pub changes: mpsc::UnboundedReceiver<PathBuf>,
}

impl SettingsWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Start watching.
    ///
    /// The parent directory is watched because saves replace the file by
    /// rename, which would orphan a watch on the file itself.
    pub fn start(&self) -> Result<SettingsWatchHandle> {
        let (tx, rx) = mpsc::unbounded_channel();
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .context("Settings path has no file name")?;
        let watched = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                let event = match res {
                    Ok(event) => event,
                    Err(_) => return,
                };
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    return;
                }
                if event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == Some(file_name.as_os_str()))
                {
                    let _ = tx.send(watched.clone());
                }
            },
            notify::Config::default(),
        )
        .context("Failed to create settings watcher")?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;
        info!(path = %self.path.display(), "Watching settings file");

        Ok(SettingsWatchHandle {
            _watcher: watcher,
            changes: rx,
        })
    }
}
