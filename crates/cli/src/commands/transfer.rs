//! Exporting history and settings, importing settings

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::client::{ApiClient, ConfigView};
use crate::output::{print_json, print_success, OutputFormat};

/// The parts of an exported settings document the CLI reports on
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsSummary {
    config: ConfigView,
    #[serde(default)]
    custom_endpoints: Vec<serde_json::Value>,
}

async fn write_or_print(content: &str, output: Option<&Path>, what: &str) -> Result<()> {
    match output {
        Some(path) => {
            tokio::fs::write(path, content)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            print_success(&format!("{} exported to {}", what, path.display()));
        }
        None => println!("{}", content),
    }
    Ok(())
}

/// Download the latency history as CSV
pub async fn export_history(client: &ApiClient, output: Option<&Path>) -> Result<()> {
    let csv = client.get_text("api/v1/history.csv").await?;
    write_or_print(&csv, output, "History").await
}

/// Download the daemon's settings document
pub async fn export_settings(client: &ApiClient, output: Option<&Path>) -> Result<()> {
    let settings: serde_json::Value = client.get("api/v1/settings/export").await?;
    let content = serde_json::to_string_pretty(&settings)?;
    write_or_print(&content, output, "Settings").await
}

/// Upload a settings document; the daemon validates it before applying anything
pub async fn import_settings(client: &ApiClient, file: &Path, format: OutputFormat) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let document: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in {}", file.display()))?;

    let applied: serde_json::Value = client.post("api/v1/settings/import", &document).await?;
    match format {
        OutputFormat::Json => print_json(&applied)?,
        OutputFormat::Table => {
            let summary: SettingsSummary =
                serde_json::from_value(applied).context("Unexpected settings response")?;
            print_success(&format!(
                "Settings imported from {} (mode {}, interval {}s, {} custom endpoint(s))",
                file.display(),
                summary.config.mode,
                summary.config.test_interval_sec,
                summary.custom_endpoints.len()
            ));
        }
    }
    Ok(())
}
