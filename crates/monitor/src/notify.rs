//! Bundled notifier, status sink and storage path source

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use monitor_lib::catalog::storage_targets;
use monitor_lib::probe::{Notifier, StatusSink, StoragePathSource};
use monitor_lib::{LatencyThresholds, Level, MonitorMetrics, StorageKind, StoragePathTarget};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Writes alerts to the log only
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<()> {
        warn!(title = %title, body = %body, "Alert");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookAlert {
    status: &'static str,
    labels: BTreeMap<&'static str, String>,
    annotations: BTreeMap<&'static str, String>,
    starts_at: String,
}

#[derive(Debug, Serialize)]
struct WebhookPayload {
    alerts: Vec<WebhookAlert>,
}

/// Posts alerts as an Alertmanager-style JSON payload
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    node_name: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, node_name: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build webhook client")?;
        Ok(Self {
            client,
            url: url.into(),
            node_name: node_name.into(),
        })
    }

    fn payload(&self, title: &str, body: &str) -> WebhookPayload {
        let severity = if title.starts_with("Critical") {
            "critical"
        } else {
            "warning"
        };
        let mut labels = BTreeMap::new();
        labels.insert("alertname", title.to_string());
        labels.insert("severity", severity.to_string());
        labels.insert("node", self.node_name.clone());

        let mut annotations = BTreeMap::new();
        annotations.insert("summary", title.to_string());
        annotations.insert("description", body.to_string());

        WebhookPayload {
            alerts: vec![WebhookAlert {
                status: "firing",
                labels,
                annotations,
                starts_at: Utc::now().to_rfc3339(),
            }],
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&self.payload(title, body))
            .send()
            .await
            .context("Failed to reach alert webhook")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Alert webhook returned {}", status);
        }
        debug!(url = %self.url, title = %title, "Alert delivered to webhook");
        Ok(())
    }
}

/// Exposes the aggregate status through Prometheus gauges
pub struct MetricsStatusSink {
    metrics: MonitorMetrics,
}

impl MetricsStatusSink {
    pub fn new(metrics: MonitorMetrics) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl StatusSink for MetricsStatusSink {
    async fn publish(&self, average_ms: f64, level: Level, _thresholds: &LatencyThresholds) -> Result<()> {
        self.metrics.set_status(average_ms, level);
        Ok(())
    }
}

/// Storage paths taken from the daemon configuration
pub struct ConfiguredStoragePaths {
    profile_paths: String,
    container_paths: String,
}

impl ConfiguredStoragePaths {
    pub fn new(profile_paths: impl Into<String>, container_paths: impl Into<String>) -> Self {
        Self {
            profile_paths: profile_paths.into(),
            container_paths: container_paths.into(),
        }
    }
}

#[async_trait]
impl StoragePathSource for ConfiguredStoragePaths {
    async fn list_storage_paths(&self) -> Result<Vec<StoragePathTarget>> {
        let mut paths = storage_targets(StorageKind::Profile, &self.profile_paths);
        paths.extend(storage_targets(StorageKind::Container, &self.container_paths));
        if !paths.is_empty() {
            info!(count = paths.len(), "Storage paths discovered");
        }
        Ok(paths)
    }
}
