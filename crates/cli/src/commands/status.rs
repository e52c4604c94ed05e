//! Read-only monitor commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{AlertsResponse, ApiClient, StatusResponse, TargetStatusView, TestResponse};
use crate::output::{
    color_level, format_flag, format_latency, format_timestamp, print_info, print_json,
    print_success, print_warning, OutputFormat,
};

/// Row for network and storage tables
#[derive(Tabled)]
struct TargetRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "Latency")]
    latency: String,
    #[tabled(rename = "Level")]
    level: String,
    #[tabled(rename = "Muted")]
    muted: String,
    #[tabled(rename = "Updated")]
    updated: String,
    #[tabled(rename = "Error")]
    error: String,
}

impl From<&TargetStatusView> for TargetRow {
    fn from(s: &TargetStatusView) -> Self {
        let name = if s.target.enabled {
            s.target.display_name().to_string()
        } else {
            format!("{} (disabled)", s.target.display_name())
                .dimmed()
                .to_string()
        };
        Self {
            id: s.target.id.clone(),
            name,
            host: format!("{}:{}", s.target.hostname, s.target.port),
            latency: if s.is_loading {
                "...".to_string()
            } else {
                format_latency(s.current_latency)
            },
            level: color_level(&s.level),
            muted: format_flag(s.target.muted),
            updated: format_timestamp(s.last_updated_ms),
            error: s
                .last_error
                .as_ref()
                .map(|e| e.user_message.red().to_string())
                .unwrap_or_default(),
        }
    }
}

/// Row for the alert gate table
#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "Group")]
    group: String,
    #[tabled(rename = "Breaches")]
    breaches: u32,
    #[tabled(rename = "Last Sent")]
    last_sent: String,
    #[tabled(rename = "Sending")]
    sending: String,
}

fn print_targets(statuses: &[TargetStatusView]) {
    let rows: Vec<TargetRow> = statuses.iter().map(TargetRow::from).collect();
    let table = tabled::Table::new(rows)
        .with(tabled::settings::Style::rounded())
        .to_string();
    println!("{}", table);
}

/// Show the overall status and every network target
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status: StatusResponse = client.get("api/v1/status").await?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            println!(
                "Mode: {}   Average: {} [{}]",
                status.mode.bold(),
                format_latency(status.average_latency_ms),
                color_level(&status.level)
            );
            if status.offline {
                print_warning("Host appears to be offline");
            }
            if status.paused {
                print_info("Monitoring is paused");
            }
            println!();

            if status.network.is_empty() {
                print_warning("No network targets configured");
            } else {
                print_targets(&status.network);
            }
            if !status.storage.is_empty() {
                println!("\n{} storage path(s), see `pwctl storage`", status.storage.len());
            }
        }
    }

    Ok(())
}

/// Show storage path statuses
pub async fn show_storage(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let storage: Vec<TargetStatusView> = client.get("api/v1/storage").await?;

    match format {
        OutputFormat::Json => print_json(&storage)?,
        OutputFormat::Table => {
            if storage.is_empty() {
                print_warning("No storage paths monitored");
                return Ok(());
            }
            print_targets(&storage);
        }
    }

    Ok(())
}

/// Show alert gate bookkeeping
pub async fn show_alerts(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let alerts: AlertsResponse = client.get("api/v1/alerts").await?;

    match format {
        OutputFormat::Json => print_json(&alerts)?,
        OutputFormat::Table => {
            let mut rows = vec![AlertRow {
                group: "network".to_string(),
                breaches: alerts.network.consecutive_breaches,
                last_sent: format_timestamp(alerts.network.last_notified_at_ms),
                sending: format_flag(alerts.network.send_in_progress),
            }];
            let mut storage: Vec<_> = alerts.storage.iter().collect();
            storage.sort_by(|a, b| a.0.cmp(b.0));
            rows.extend(storage.into_iter().map(|(id, gate)| AlertRow {
                group: id.clone(),
                breaches: gate.consecutive_breaches,
                last_sent: format_timestamp(gate.last_notified_at_ms),
                sending: format_flag(gate.send_in_progress),
            }));

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}

/// Probe every target now
pub async fn run_tests(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let response: TestResponse = client.post("api/v1/test", &serde_json::json!({})).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            for run in &response.runs {
                match (&run.class, run.skipped) {
                    (Some(class), true) => print_warning(&format!(
                        "{}: targets changed while probing, {} result(s) discarded",
                        class, run.stale
                    )),
                    (None, true) => print_warning("A batch was already running, skipped"),
                    (Some(class), false) => print_success(&format!(
                        "{}: probed {}, failed {}, average {}{}",
                        class,
                        run.probed,
                        run.failed,
                        format_latency(run.average_ms),
                        if run.alerts_sent > 0 {
                            format!(", {} alert(s) sent", run.alerts_sent)
                        } else {
                            String::new()
                        }
                    )),
                    (None, false) => {}
                }
            }
        }
    }

    Ok(())
}
