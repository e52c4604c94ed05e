//! Output formatting utilities

use chrono::{TimeZone, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print any response as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Short label of a level as the daemon serializes it
pub fn level_label(level: &str) -> &'static str {
    match level {
        "excellent" => "OK",
        "good" => "GOOD",
        "warning" => "WARN",
        "critical" => "CRIT",
        _ => "-",
    }
}

/// Color a level label
pub fn color_level(level: &str) -> String {
    let label = level_label(level);
    match level {
        "excellent" | "good" => label.green().to_string(),
        "warning" => label.yellow().to_string(),
        "critical" => label.red().bold().to_string(),
        _ => label.dimmed().to_string(),
    }
}

/// Format a latency in milliseconds
pub fn format_latency(latency_ms: Option<f64>) -> String {
    match latency_ms {
        Some(v) => format!("{:.0}ms", v),
        None => "-".to_string(),
    }
}

/// Format an epoch-milliseconds timestamp as UTC time of day
pub fn format_timestamp(timestamp_ms: Option<i64>) -> String {
    timestamp_ms
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Format a yes/no flag
pub fn format_flag(value: bool) -> String {
    if value {
        "yes".yellow().to_string()
    } else {
        "no".to_string()
    }
}
