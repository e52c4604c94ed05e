//! API client for communicating with the Pulsewatch daemon

use std::collections::HashMap;

use anyhow::{Context, Result};
use reqwest::{Client, Method};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// API client for the monitor's control API
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send::<T, ()>(Method::GET, path, None).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        self.send(Method::POST, path, Some(body)).await
    }

    /// Make a PATCH request with JSON body
    pub async fn patch<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        self.send(Method::PATCH, path, Some(body)).await
    }

    /// Make a GET request for a plain-text body
    pub async fn get_text(&self, path: &str) -> Result<String> {
        let response = self.execute::<()>(Method::GET, path, None).await?;
        response.text().await.context("Failed to read response")
    }

    async fn send<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let response = self.execute(method, path, body).await?;
        response.json().await.context("Failed to parse response")
    }

    async fn execute<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        Ok(response)
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetView {
    pub id: String,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    pub hostname: String,
    pub port: u16,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub category: Option<String>,
}

fn default_true() -> bool {
    true
}

impl TargetView {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.path.as_deref())
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorView {
    pub kind: String,
    pub message: String,
    pub user_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetStatusView {
    pub target: TargetView,
    pub current_latency: Option<f64>,
    pub level: String,
    pub last_updated_ms: Option<i64>,
    #[serde(default)]
    pub last_error: Option<ErrorView>,
    #[serde(default)]
    pub is_loading: bool,
    #[serde(default)]
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertView {
    pub consecutive_breaches: u32,
    pub last_notified_at_ms: Option<i64>,
    pub send_in_progress: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsResponse {
    pub network: AlertView,
    pub storage: HashMap<String, AlertView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub mode: String,
    pub paused: bool,
    pub offline: bool,
    pub average_latency_ms: Option<f64>,
    pub level: String,
    pub network: Vec<TargetStatusView>,
    pub storage: Vec<TargetStatusView>,
    pub alerts: AlertsResponse,
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunView {
    pub class: Option<String>,
    pub skipped: bool,
    pub probed: usize,
    pub failed: usize,
    pub stale: usize,
    pub average_ms: Option<f64>,
    pub alerts_sent: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResponse {
    pub runs: Vec<RunView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PausedResponse {
    pub paused: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeRequest {
    pub mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeResponse {
    pub mode: String,
    pub targets: Vec<TargetView>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub excellent: f64,
    pub good: f64,
    pub warning: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigView {
    pub test_interval_sec: u64,
    pub thresholds: Thresholds,
    pub notifications_enabled: bool,
    pub alert_threshold: u32,
    pub alert_cooldown_min: u64,
    pub storage_enabled: bool,
    pub storage_test_interval_sec: u64,
    pub storage_alert_threshold: u32,
    pub storage_alert_cooldown_min: u64,
    pub mode: String,
}

/// Partial config update; unset fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_interval_sec: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<Thresholds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifications_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_threshold: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_cooldown_min: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_test_interval_sec: Option<u64>,
}

impl ConfigPatch {
    pub fn is_empty(&self) -> bool {
        self.test_interval_sec.is_none()
            && self.thresholds.is_none()
            && self.notifications_enabled.is_none()
            && self.alert_threshold.is_none()
            && self.alert_cooldown_min.is_none()
            && self.storage_enabled.is_none()
            && self.storage_test_interval_sec.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
