//! Pulsewatch CLI
//!
//! A command-line tool for inspecting and steering a running
//! pulsewatch latency monitor through its control API.

mod client;
mod commands;
mod config;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::control::{self, TargetAction};
use commands::{status, transfer};

/// Pulsewatch CLI
#[derive(Parser)]
#[command(name = "pwctl")]
#[command(author, version, about = "CLI for the Pulsewatch latency monitor", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via PULSEWATCH_API_URL env var)
    #[arg(long, env = "PULSEWATCH_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show overall latency and network target status
    Status,

    /// Show storage path status
    Storage,

    /// Show alert gate state
    Alerts,

    /// Probe every target immediately
    Test,

    /// Pause scheduled probing
    Pause,

    /// Resume scheduled probing
    Resume,

    /// Switch the monitoring mode
    Mode {
        /// Mode to switch to
        #[arg(value_parser = ["sessionhost", "enduser"])]
        mode: String,
    },

    /// Mute alerts for a target
    Mute {
        /// Target ID
        id: String,

        /// The ID names a storage path
        #[arg(long)]
        storage: bool,
    },

    /// Unmute alerts for a target
    Unmute {
        /// Target ID
        id: String,

        /// The ID names a storage path
        #[arg(long)]
        storage: bool,
    },

    /// Enable probing of a network target
    Enable {
        /// Target ID
        id: String,
    },

    /// Disable probing of a network target
    Disable {
        /// Target ID
        id: String,
    },

    /// View or change monitor configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Export latency history as CSV
    ExportHistory {
        /// File to write; prints to stdout when omitted
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Export the daemon's settings as JSON
    Export {
        /// File to write; prints to stdout when omitted
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Import settings from a JSON file
    Import {
        /// Settings file to import
        file: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the current configuration
    Show,

    /// Change configuration values
    Set {
        /// Seconds between network batches
        #[arg(long)]
        test_interval: Option<u64>,

        /// Level thresholds in ms as excellent,good,warning
        #[arg(long)]
        thresholds: Option<String>,

        /// Enable or disable notifications
        #[arg(long)]
        notifications: Option<bool>,

        /// Consecutive breaching batches before alerting
        #[arg(long)]
        alert_threshold: Option<u32>,

        /// Minutes between repeated alerts
        #[arg(long)]
        cooldown: Option<u64>,

        /// Enable or disable storage monitoring
        #[arg(long)]
        storage_enabled: Option<bool>,

        /// Seconds between storage batches
        #[arg(long)]
        storage_interval: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let api_url = config::Config::load()?.resolve_api_url(cli.api_url);
    if cli.verbose {
        output::print_info(&format!("Using API at {}", api_url));
    }

    // Initialize client
    let client = client::ApiClient::new(&api_url)?;

    // Execute command
    match cli.command {
        Commands::Status => status::show_status(&client, cli.format).await?,
        Commands::Storage => status::show_storage(&client, cli.format).await?,
        Commands::Alerts => status::show_alerts(&client, cli.format).await?,
        Commands::Test => status::run_tests(&client, cli.format).await?,
        Commands::Pause => control::set_paused(&client, true, cli.format).await?,
        Commands::Resume => control::set_paused(&client, false, cli.format).await?,
        Commands::Mode { mode } => control::switch_mode(&client, &mode, cli.format).await?,
        Commands::Mute { id, storage } => {
            control::target_action(&client, &id, TargetAction::Mute, storage, cli.format).await?
        }
        Commands::Unmute { id, storage } => {
            control::target_action(&client, &id, TargetAction::Unmute, storage, cli.format).await?
        }
        Commands::Enable { id } => {
            control::target_action(&client, &id, TargetAction::Enable, false, cli.format).await?
        }
        Commands::Disable { id } => {
            control::target_action(&client, &id, TargetAction::Disable, false, cli.format).await?
        }
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Show => control::show_config(&client, cli.format).await?,
            ConfigCommands::Set {
                test_interval,
                thresholds,
                notifications,
                alert_threshold,
                cooldown,
                storage_enabled,
                storage_interval,
            } => {
                let patch = client::ConfigPatch {
                    test_interval_sec: test_interval,
                    thresholds: thresholds
                        .as_deref()
                        .map(control::parse_thresholds)
                        .transpose()?,
                    notifications_enabled: notifications,
                    alert_threshold,
                    alert_cooldown_min: cooldown,
                    storage_enabled,
                    storage_test_interval_sec: storage_interval,
                };
                control::set_config(&client, patch, cli.format).await?;
            }
        },
        Commands::ExportHistory { output } => {
            transfer::export_history(&client, output.as_deref()).await?
        }
        Commands::Export { output } => transfer::export_settings(&client, output.as_deref()).await?,
        Commands::Import { file } => transfer::import_settings(&client, &file, cli.format).await?,
    }

    Ok(())
}
