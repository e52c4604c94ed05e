//! Commands that change the monitor's state

use anyhow::{bail, Context, Result};
use colored::Colorize;
use tabled::Tabled;

use crate::client::{
    ApiClient, ConfigPatch, ConfigView, ModeRequest, ModeResponse, PausedResponse, TargetView,
    Thresholds,
};
use crate::output::{print_info, print_json, print_success, OutputFormat};

/// Action on a single target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetAction {
    Mute,
    Unmute,
    Enable,
    Disable,
}

impl TargetAction {
    fn as_str(&self) -> &'static str {
        match self {
            TargetAction::Mute => "mute",
            TargetAction::Unmute => "unmute",
            TargetAction::Enable => "enable",
            TargetAction::Disable => "disable",
        }
    }

    fn past_tense(&self) -> &'static str {
        match self {
            TargetAction::Mute => "muted",
            TargetAction::Unmute => "unmuted",
            TargetAction::Enable => "enabled",
            TargetAction::Disable => "disabled",
        }
    }
}

pub async fn set_paused(client: &ApiClient, paused: bool, format: OutputFormat) -> Result<()> {
    let path = if paused { "api/v1/pause" } else { "api/v1/resume" };
    let response: PausedResponse = client.post(path, &serde_json::json!({})).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table if response.paused => print_success("Monitoring paused"),
        OutputFormat::Table => print_success("Monitoring resumed"),
    }
    Ok(())
}

pub async fn switch_mode(client: &ApiClient, mode: &str, format: OutputFormat) -> Result<()> {
    let response: ModeResponse = client
        .post(
            "api/v1/mode",
            &ModeRequest {
                mode: mode.to_string(),
            },
        )
        .await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => print_success(&format!(
            "Switched to {} mode, {} target(s) loaded",
            response.mode.bold(),
            response.targets.len()
        )),
    }
    Ok(())
}

pub async fn target_action(
    client: &ApiClient,
    id: &str,
    action: TargetAction,
    storage: bool,
    format: OutputFormat,
) -> Result<()> {
    if storage && matches!(action, TargetAction::Enable | TargetAction::Disable) {
        bail!("Storage paths can only be muted or unmuted");
    }
    let scope = if storage { "storage" } else { "targets" };
    let path = format!("api/v1/{}/{}/{}", scope, id, action.as_str());
    let target: TargetView = client.post(&path, &serde_json::json!({})).await?;

    match format {
        OutputFormat::Json => print_json(&target)?,
        OutputFormat::Table => print_success(&format!(
            "{} {}",
            target.display_name(),
            action.past_tense()
        )),
    }
    Ok(())
}

/// Parse `excellent,good,warning`
pub fn parse_thresholds(value: &str) -> Result<Thresholds> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .with_context(|| format!("Invalid thresholds '{}'", value))?;

    match parts.as_slice() {
        [excellent, good, warning] => Ok(Thresholds {
            excellent: *excellent,
            good: *good,
            warning: *warning,
        }),
        _ => bail!("Expected three thresholds as excellent,good,warning"),
    }
}

#[derive(Tabled)]
struct ConfigRow {
    #[tabled(rename = "Setting")]
    key: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

fn config_rows(config: &ConfigView) -> Vec<ConfigRow> {
    let row = |key, value: String| ConfigRow { key, value };
    vec![
        row("mode", config.mode.clone()),
        row("test interval", format!("{}s", config.test_interval_sec)),
        row(
            "thresholds",
            format!(
                "{} / {} / {} ms",
                config.thresholds.excellent, config.thresholds.good, config.thresholds.warning
            ),
        ),
        row("notifications", config.notifications_enabled.to_string()),
        row("alert threshold", config.alert_threshold.to_string()),
        row("alert cooldown", format!("{}m", config.alert_cooldown_min)),
        row("storage", config.storage_enabled.to_string()),
        row("storage interval", format!("{}s", config.storage_test_interval_sec)),
        row("storage alert threshold", config.storage_alert_threshold.to_string()),
        row("storage alert cooldown", format!("{}m", config.storage_alert_cooldown_min)),
    ]
}

fn print_config(config: &ConfigView) {
    let table = tabled::Table::new(config_rows(config))
        .with(tabled::settings::Style::rounded())
        .to_string();
    println!("{}", table);
}

pub async fn show_config(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let config: ConfigView = client.get("api/v1/config").await?;
    match format {
        OutputFormat::Json => print_json(&config)?,
        OutputFormat::Table => print_config(&config),
    }
    Ok(())
}

pub async fn set_config(client: &ApiClient, patch: ConfigPatch, format: OutputFormat) -> Result<()> {
    if patch.is_empty() {
        print_info("Nothing to change");
        return Ok(());
    }

    let config: ConfigView = client.patch("api/v1/config", &patch).await?;
    match format {
        OutputFormat::Json => print_json(&config)?,
        OutputFormat::Table => {
            print_success("Configuration updated");
            print_config(&config);
        }
    }
    Ok(())
}
