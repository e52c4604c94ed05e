//! Network target catalogs and storage path parsing
//!
//! Endpoint files live at `<dir>/<mode>-endpoints.json` and group endpoints
//! into categories. Wildcard entries (`*.domain`) are expanded into one
//! target per known subdomain. Custom endpoints are appended to every mode.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use crate::error::EngineError;
use crate::models::{Mode, NetworkTarget, Protocol, StorageKind, StoragePathTarget};
use crate::probe::{async_trait, TargetCatalog};

/// Port probed for SMB storage paths
pub const SMB_PORT: u16 = 445;

/// Endpoint as written in an endpoint file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDefinition {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub protocol: Option<Protocol>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub muted: Option<bool>,
    #[serde(default)]
    pub latency_critical: Option<bool>,
    #[serde(default)]
    pub wildcard_pattern: Option<String>,
    #[serde(default)]
    pub known_subdomains: Option<Vec<String>>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointCategory {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub endpoints: Vec<EndpointDefinition>,
}

/// Contents of a `<mode>-endpoints.json` file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointFile {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    pub categories: Vec<EndpointCategory>,
}

/// User-added endpoint, persisted in the settings file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomEndpoint {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub protocol: Option<Protocol>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub latency_critical: bool,
}

impl CustomEndpoint {
    pub fn to_target(&self) -> Result<NetworkTarget, EngineError> {
        let (hostname, url_port) = normalize_endpoint_url(&self.url)?;
        Ok(NetworkTarget {
            id: self.id.clone(),
            name: self.name.clone(),
            hostname,
            port: self.port.or(url_port).unwrap_or(443),
            protocol: self.protocol.unwrap_or_default(),
            enabled: self.enabled,
            muted: false,
            latency_critical: self.latency_critical,
            category: Some(self.category.clone().unwrap_or_else(|| "Custom".to_string())),
        })
    }
}

/// Extract the hostname and explicit port from an endpoint URL.
///
/// Accepts bare hostnames (`login.example.com`, `host:8443/path`) and full
/// URLs (`https://login.example.com/path`).
pub fn normalize_endpoint_url(raw: &str) -> Result<(String, Option<u16>), EngineError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidConfig("endpoint url is empty".to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("tcp://{}", trimmed)
    };
    let parsed = Url::parse(&candidate)
        .map_err(|e| EngineError::InvalidConfig(format!("invalid endpoint url '{}': {}", raw, e)))?;

    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| EngineError::InvalidConfig(format!("endpoint url '{}' has no host", raw)))?;
    if host.contains('*') {
        return Err(EngineError::InvalidConfig(format!(
            "endpoint url '{}' contains a wildcard; use wildcardPattern",
            raw
        )));
    }

    Ok((host.to_string(), parsed.port()))
}

/// Flatten an endpoint file into targets, expanding wildcard entries
pub fn targets_from_file(file: &EndpointFile) -> Vec<NetworkTarget> {
    let mut targets = Vec::new();

    for category in &file.categories {
        for def in &category.endpoints {
            match (&def.wildcard_pattern, &def.known_subdomains) {
                (Some(pattern), Some(subdomains)) => {
                    let base = pattern.trim_start_matches("*.");
                    for sub in subdomains {
                        let url = format!("{}.{}", sub, base);
                        let id = format!("{}-{}", def.id, sub);
                        let name = format!("{} ({})", def.name, sub);
                        if let Some(target) = build_target(def, &category.name, id, name, &url) {
                            targets.push(target);
                        }
                    }
                }
                _ => {
                    if let Some(target) =
                        build_target(def, &category.name, def.id.clone(), def.name.clone(), &def.url)
                    {
                        targets.push(target);
                    }
                }
            }
        }
    }
    targets
}

fn build_target(
    def: &EndpointDefinition,
    category: &str,
    id: String,
    name: String,
    url: &str,
) -> Option<NetworkTarget> {
    let (hostname, url_port) = match normalize_endpoint_url(url) {
        Ok(v) => v,
        Err(e) => {
            warn!(endpoint_id = %id, error = %e, "Skipping endpoint with invalid url");
            return None;
        }
    };

    Some(NetworkTarget {
        id,
        name,
        hostname,
        port: def.port.or(url_port).unwrap_or(443),
        protocol: def.protocol.unwrap_or_default(),
        enabled: def.enabled,
        muted: def.muted.unwrap_or(false),
        latency_critical: def.latency_critical.unwrap_or(true),
        category: Some(category.to_string()),
    })
}

/// File name of the endpoint file for a mode
pub fn endpoint_file_name(mode: Mode) -> String {
    format!("{}-endpoints.json", mode.as_str())
}

/// Catalog backed by endpoint files on disk
pub struct FileCatalog {
    dir: PathBuf,
    custom: RwLock<Vec<CustomEndpoint>>,
}

impl FileCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            custom: RwLock::new(Vec::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn set_custom_endpoints(&self, endpoints: Vec<CustomEndpoint>) {
        *self.custom.write().await = endpoints;
    }

    pub async fn load_file(&self, mode: Mode) -> Result<EndpointFile> {
        let path = self.dir.join(endpoint_file_name(mode));
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read endpoint file {}", path.display()))?;
        let file: EndpointFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse endpoint file {}", path.display()))?;
        Ok(file)
    }
}

#[async_trait]
impl TargetCatalog for FileCatalog {
    async fn targets_for_mode(&self, mode: Mode) -> Result<Vec<NetworkTarget>> {
        let file = self.load_file(mode).await?;
        let mut targets = targets_from_file(&file);

        for custom in self.custom.read().await.iter() {
            match custom.to_target() {
                Ok(target) if targets.iter().any(|t| t.id == target.id) => {
                    warn!(endpoint_id = %target.id, "Custom endpoint id collides with catalog entry");
                }
                Ok(target) => targets.push(target),
                Err(e) => warn!(endpoint_id = %custom.id, error = %e, "Skipping invalid custom endpoint"),
            }
        }

        debug!(mode = %mode, targets = targets.len(), "Loaded endpoint catalog");
        Ok(targets)
    }
}

/// In-memory catalog
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    by_mode: HashMap<Mode, Vec<NetworkTarget>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: Mode, targets: Vec<NetworkTarget>) -> Self {
        self.by_mode.insert(mode, targets);
        self
    }
}

#[async_trait]
impl TargetCatalog for StaticCatalog {
    async fn targets_for_mode(&self, mode: Mode) -> Result<Vec<NetworkTarget>> {
        Ok(self.by_mode.get(&mode).cloned().unwrap_or_default())
    }
}

/// Hostname part of a UNC path (`\\host\share\dir` -> `host`)
pub fn unc_hostname(unc: &str) -> Option<String> {
    let host = unc.trim_start_matches('\\').split('\\').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// Split a `;`-separated location list, keeping only UNC paths
pub fn parse_unc_locations(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|s| s.starts_with(r"\\"))
        .map(str::to_string)
        .collect()
}

/// Build storage targets for one container kind
pub fn storage_targets(kind: StorageKind, locations: &str) -> Vec<StoragePathTarget> {
    parse_unc_locations(locations)
        .into_iter()
        .filter_map(|path| {
            let hostname = unc_hostname(&path)?;
            Some((path, hostname))
        })
        .enumerate()
        .map(|(index, (path, hostname))| StoragePathTarget {
            id: format!("storage-{}-{}", kind, index),
            kind,
            path,
            hostname,
            port: SMB_PORT,
            muted: false,
        })
        .collect()
}
