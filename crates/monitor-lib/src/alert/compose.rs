//! Notification titles and bodies

use crate::models::{Level, Probed, StoragePathTarget};
use crate::status::TargetStatus;

pub const CRITICAL_TITLE: &str = "Critical Latency Detected";
pub const WARNING_TITLE: &str = "High Latency Warning";
pub const STORAGE_TITLE: &str = "Storage Path Unreachable";

/// Title for the aggregate network alert, keyed on the average's level
pub fn network_title(average_level: Level) -> &'static str {
    if average_level == Level::Critical {
        CRITICAL_TITLE
    } else {
        WARNING_TITLE
    }
}

/// Whether a status takes part in the network alert
pub fn alertable(status: &TargetStatus) -> bool {
    status.target.enabled() && !status.target.muted() && status.target.latency_critical()
}

/// Body of the aggregate network alert.
///
/// `statuses` must be in display order; muted and non latency-critical
/// targets are left out.
pub fn network_body<'a, I>(average_ms: f64, average_level: Level, statuses: I) -> String
where
    I: IntoIterator<Item = &'a TargetStatus>,
{
    let mut lines = vec![format!(
        "Average: {:.1}ms [{}]",
        average_ms,
        average_level.label()
    )];

    let mut critical = Vec::new();
    let mut warning = Vec::new();
    for status in statuses.into_iter().filter(|s| alertable(s)) {
        let latency = match status.current_latency {
            Some(v) => v,
            None => continue,
        };
        let entry = format!("{}: {:.0}ms", status.target.display_name(), latency);
        match status.level {
            Level::Critical => critical.push(entry),
            Level::Warning => warning.push(entry),
            _ => {}
        }
    }

    if !critical.is_empty() {
        lines.push(format!("Critical: {}", critical.join(", ")));
    }
    if !warning.is_empty() {
        lines.push(format!("Warning: {}", warning.join(", ")));
    }
    lines.join("\n")
}

/// Body of a per-path storage alert
pub fn storage_body(target: &StoragePathTarget, status: &TargetStatus) -> String {
    let reason = status
        .last_error
        .as_ref()
        .map(|e| e.user_message.as_str())
        .unwrap_or("Connection failed");
    let location = if target.path.is_empty() {
        target.hostname.clone()
    } else {
        target.path.clone()
    };
    format!(
        "{} storage {} is unreachable on port {}: {}",
        capitalize(&target.kind.to_string()),
        location,
        target.port,
        reason
    )
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
