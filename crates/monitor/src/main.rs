//! Pulsewatch - network and storage latency monitor
//!
//! Probes the configured endpoints on a schedule, raises deduplicated
//! alerts and serves health, metrics and control endpoints.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use monitor_lib::{
    catalog::FileCatalog,
    probe::Notifier,
    settings::{SettingsFile, SettingsWatcher},
    Monitor, MonitorMetrics,
};
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;
mod notify;
mod probe;

/// History is flushed to disk at least this often
const PERSIST_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting pulsewatch");

    let config = config::MonitorConfig::load()?;
    info!(
        node_name = %config.node_name,
        settings_path = %config.settings_path.display(),
        catalog_dir = %config.catalog_dir.display(),
        "Monitor configured"
    );

    let settings = match SettingsFile::load(&config.settings_path).await {
        Ok(settings) => settings,
        Err(e) => {
            warn!(error = %e, "Failed to load settings, using defaults");
            SettingsFile::default()
        }
    };

    let catalog = Arc::new(FileCatalog::new(&config.catalog_dir));
    catalog
        .set_custom_endpoints(settings.custom_endpoints.clone())
        .await;

    let notifier: Arc<dyn Notifier> = match &config.webhook_url {
        Some(url) => {
            info!(url = %url, "Delivering alerts to webhook");
            Arc::new(notify::WebhookNotifier::new(url, &config.node_name)?)
        }
        None => Arc::new(notify::LogNotifier),
    };

    let metrics = MonitorMetrics::new();
    let monitor = Monitor::builder()
        .settings(&settings)
        .executor(Arc::new(probe::NativeProbeExecutor::new()?))
        .notifier(notifier)
        .catalog(catalog.clone())
        .status_sink(Arc::new(notify::MetricsStatusSink::new(metrics)))
        .storage_source(Arc::new(notify::ConfiguredStoragePaths::new(
            &config.profile_paths,
            &config.container_paths,
        )))
        .node_name(&config.node_name)
        .build()?;
    let monitor = Arc::new(monitor);

    monitor.initialize().await;
    let restored = monitor.restore_history(settings.history.clone()).await;
    if restored > 0 {
        info!(targets = restored, "Restored latency history");
    }
    monitor.start().await?;

    // Persisted base carries fields the monitor does not own
    let base = Arc::new(RwLock::new(settings));
    let (persist_tx, persist_rx) = mpsc::unbounded_channel();
    let persister = tokio::spawn(run_persister(
        monitor.clone(),
        base.clone(),
        config.settings_path.clone(),
        persist_rx,
    ));

    let watcher = match SettingsWatcher::new(&config.settings_path).start() {
        Ok(handle) => Some(tokio::spawn(run_settings_reload(
            monitor.clone(),
            catalog.clone(),
            base.clone(),
            handle,
        ))),
        Err(e) => {
            warn!(error = %e, "Settings file watching disabled");
            None
        }
    };

    let app_state = Arc::new(
        api::AppState::new(monitor.clone(), Some(persist_tx)).with_settings(base.clone(), catalog),
    );
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    monitor.shutdown("SIGINT received").await;

    api_handle.abort();
    if let Some(watcher) = watcher {
        watcher.abort();
    }
    persister.abort();
    persist(&monitor, &base, &config.settings_path).await;

    Ok(())
}

async fn persist(monitor: &Monitor, base: &RwLock<SettingsFile>, path: &Path) {
    let settings = monitor.export_settings(base.read().await.clone()).await;
    if let Err(e) = settings.save(path).await {
        error!(path = %path.display(), error = %e, "Failed to save settings");
    }
}

/// Save settings on request and periodically for history
async fn run_persister(
    monitor: Arc<Monitor>,
    base: Arc<RwLock<SettingsFile>>,
    path: PathBuf,
    mut requests: mpsc::UnboundedReceiver<()>,
) {
    let mut ticker = tokio::time::interval(PERSIST_INTERVAL);
    ticker.tick().await;

    loop {
        tokio::select! {
            request = requests.recv() => {
                if request.is_none() {
                    break;
                }
                persist(&monitor, &base, &path).await;
            }
            _ = ticker.tick() => persist(&monitor, &base, &path).await,
        }
    }
}

/// Apply external edits of the settings file
async fn run_settings_reload(
    monitor: Arc<Monitor>,
    catalog: Arc<FileCatalog>,
    base: Arc<RwLock<SettingsFile>>,
    mut handle: monitor_lib::settings::SettingsWatchHandle,
) {
    while let Some(path) = handle.changes.recv().await {
        let loaded = match SettingsFile::load(&path).await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring invalid settings file");
                continue;
            }
        };

        if let Err(e) = monitor.replace_config(loaded.config.clone()).await {
            warn!(error = %e, "Rejected settings reload");
            continue;
        }
        if base.read().await.custom_endpoints != loaded.custom_endpoints {
            catalog
                .set_custom_endpoints(loaded.custom_endpoints.clone())
                .await;
            if let Err(e) = monitor.reload_targets().await {
                warn!(error = %e, "Failed to reload network targets");
            }
            base.write().await.custom_endpoints = loaded.custom_endpoints;
        }
    }
}
