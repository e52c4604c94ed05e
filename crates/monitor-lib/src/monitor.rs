//! Monitor facade
//!
//! Wires the engine together and exposes the mutation points and read-only
//! snapshots used by the daemon's API. Mutations are serialized through a
//! control lock; probes and alerts keep running underneath.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::alert::{AlertDispatcher, AlertState};
use crate::error::EngineError;
use crate::export;
use crate::health::HealthRegistry;
use crate::invoker::{Invoker, RetryPolicy};
use crate::models::{
    Config, ConfigPatch, Level, Mode, NetworkTarget, Probed, Sample, Target, TargetClass,
    TargetOverride,
};
use crate::probe::{
    NoStoragePaths, Notifier, NullStatusSink, ProbeExecutor, StatusSink, StoragePathSource,
    TargetCatalog,
};
use crate::runner::{network_level, BatchRun, BatchRunner};
use crate::scheduler::{Scheduler, TickerSpec};
use crate::settings::SettingsFile;
use crate::state::{Clock, EngineState, SystemClock};
use crate::status::TargetStatus;

/// Alert bookkeeping of every group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSnapshot {
    pub network: AlertState,
    pub storage: HashMap<String, AlertState>,
}

/// Serializable view of the whole engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub mode: Mode,
    pub paused: bool,
    pub offline: bool,
    pub average_latency_ms: Option<f64>,
    pub level: Level,
    pub network: Vec<TargetStatus>,
    pub storage: Vec<TargetStatus>,
    pub alerts: AlertSnapshot,
    pub config: Config,
}

pub struct Monitor {
    state: Arc<EngineState>,
    scheduler: Scheduler,
    dispatcher: AlertDispatcher,
    catalog: Arc<dyn TargetCatalog>,
    storage_source: Arc<dyn StoragePathSource>,
    health: HealthRegistry,
    control: Mutex<()>,
}

impl Monitor {
    pub fn builder() -> MonitorBuilder {
        MonitorBuilder::new()
    }

    pub fn state(&self) -> &Arc<EngineState> {
        &self.state
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    /// Load network targets and storage paths without probing anything
    pub async fn initialize(&self) -> (usize, usize) {
        let _guard = self.control.lock().await;
        let config = self.state.config().await;
        self.health.register_all().await;

        let targets = match self.load_network_targets(config.mode).await {
            Ok(targets) => targets,
            Err(e) => {
                warn!(mode = %config.mode, error = %e, "Failed to load network targets");
                Vec::new()
            }
        };
        let network_count = targets.len();
        self.state
            .store(TargetClass::Network)
            .replace_targets(targets.into_iter().map(Target::Network).collect())
            .await;
        self.state
            .metrics
            .set_targets_monitored(TargetClass::Network, network_count as i64);
        let storage_count = self.reload_storage_paths(&config).await;
        (network_count, storage_count)
    }

    /// Start tickers and run both classes once, initializing first if needed
    pub async fn start(&self) -> Result<()> {
        let (network_count, storage_count) =
            if self.state.store(TargetClass::Network).generation().await == 0 {
                self.initialize().await
            } else {
                (
                    self.state.store(TargetClass::Network).len().await,
                    self.state.store(TargetClass::Storage).len().await,
                )
            };

        let _guard = self.control.lock().await;
        let config = self.state.config().await;
        self.apply_schedule(&config).await;
        self.health.set_ready(true).await;
        self.state.logger.log_startup(
            env!("CARGO_PKG_VERSION"),
            config.mode,
            network_count,
            storage_count,
        );

        self.spawn_run_all(&config);
        Ok(())
    }

    pub async fn shutdown(&self, reason: &str) {
        self.scheduler.shutdown().await;
        self.health.set_ready(false).await;
        self.state.logger.log_shutdown(reason);
    }

    /// Probe every target now and wait for the results
    pub async fn test_now(&self) -> Vec<BatchRun> {
        let config = self.state.config().await;
        let storage = config.storage_active() && !self.state.store(TargetClass::Storage).is_empty().await;
        self.scheduler.trigger_all(storage).await
    }

    pub async fn set_config(&self, patch: ConfigPatch) -> Result<Arc<Config>, EngineError> {
        let _guard = self.control.lock().await;
        let next = self.state.config().await.apply(&patch)?;
        self.install_config(next).await
    }

    pub async fn replace_config(&self, config: Config) -> Result<Arc<Config>, EngineError> {
        let _guard = self.control.lock().await;
        config.validate()?;
        self.install_config(config).await
    }

    async fn install_config(&self, next: Config) -> Result<Arc<Config>, EngineError> {
        let current = self.state.config().await;
        if *current == next {
            return Ok(current);
        }

        if next.mode != current.mode {
            let mut staged = next.clone();
            staged.mode = current.mode;
            self.state.swap_config(staged).await;
            if let Err(e) = self.switch_mode_locked(next.mode).await {
                self.state.swap_config((*current).clone()).await;
                return Err(e);
            }
        } else {
            self.state.swap_config(next).await;
        }
        let installed = self.state.config().await;

        if installed.thresholds != current.thresholds {
            for class in TargetClass::ALL {
                self.state.store(class).reclassify(&installed.thresholds).await;
            }
        }
        if !installed.notifications_enabled && current.notifications_enabled {
            for class in TargetClass::ALL {
                self.dispatcher.reset_groups(class).await;
            }
        }
        if installed.storage_active() != current.storage_active() {
            self.reload_storage_paths(&installed).await;
        }

        self.apply_schedule(&installed).await;
        info!(
            test_interval_sec = installed.test_interval_sec,
            storage_enabled = installed.storage_enabled,
            mode = %installed.mode,
            "Configuration updated"
        );
        Ok(installed)
    }

    pub async fn set_target_enabled(&self, id: &str, enabled: bool) -> Result<Target, EngineError> {
        let _guard = self.control.lock().await;
        let updated = self
            .state
            .store(TargetClass::Network)
            .update_target(id, |t| t.set_enabled(enabled))
            .await
            .ok_or_else(|| EngineError::InvalidConfig(format!("unknown target: {}", id)))?;

        self.state
            .target_overrides
            .write()
            .await
            .entry(id.to_string())
            .or_default()
            .enabled = Some(enabled);
        info!(target_id = %id, enabled = enabled, "Target enablement changed");
        Ok(updated)
    }

    /// Mute or unmute a target; muted targets keep being probed
    pub async fn set_target_muted(
        &self,
        class: TargetClass,
        id: &str,
        muted: bool,
    ) -> Result<Target, EngineError> {
        let _guard = self.control.lock().await;
        let updated = self
            .state
            .store(class)
            .update_target(id, |t| t.set_muted(muted))
            .await
            .ok_or_else(|| EngineError::InvalidConfig(format!("unknown {} target: {}", class, id)))?;

        match class {
            TargetClass::Network => {
                self.state
                    .target_overrides
                    .write()
                    .await
                    .entry(id.to_string())
                    .or_default()
                    .muted = Some(muted);
            }
            TargetClass::Storage => {
                let mut muted_set = self.state.storage_muted.write().await;
                if muted {
                    muted_set.insert(id.to_string());
                } else {
                    muted_set.remove(id);
                }
            }
        }
        info!(class = %class, target_id = %id, muted = muted, "Target mute changed");
        Ok(updated)
    }

    /// Replace the network target set with the one for `mode` and probe it
    pub async fn switch_mode(&self, mode: Mode) -> Result<Vec<NetworkTarget>, EngineError> {
        let _guard = self.control.lock().await;
        let targets = self.switch_mode_locked(mode).await?;
        let config = self.state.config().await;
        self.apply_schedule(&config).await;
        Ok(targets)
    }

    async fn switch_mode_locked(&self, mode: Mode) -> Result<Vec<NetworkTarget>, EngineError> {
        let targets = self.load_network_targets(mode).await.map_err(|e| {
            EngineError::InvalidConfig(format!("failed to load targets for {}: {:#}", mode, e))
        })?;

        let current = self.state.config().await;
        let previous = current.mode;
        let mut next = (*current).clone();
        next.mode = mode;
        self.state.swap_config(next.clone()).await;

        self.state
            .store(TargetClass::Network)
            .replace_targets(targets.iter().cloned().map(Target::Network).collect())
            .await;
        self.dispatcher.reset_groups(TargetClass::Network).await;
        self.reload_storage_paths(&next).await;

        self.state
            .logger
            .log_mode_switched(previous, mode, targets.len());
        self.spawn_run_all(&next);
        Ok(targets)
    }

    /// Re-read the network targets of the current mode and probe them.
    ///
    /// Used when the catalog changed underneath an unchanged config.
    pub async fn reload_targets(&self) -> Result<Vec<NetworkTarget>, EngineError> {
        let _guard = self.control.lock().await;
        let mode = self.state.config().await.mode;
        let targets = self.load_network_targets(mode).await.map_err(|e| {
            EngineError::InvalidConfig(format!("failed to load targets for {}: {:#}", mode, e))
        })?;

        self.state
            .store(TargetClass::Network)
            .replace_targets(targets.iter().cloned().map(Target::Network).collect())
            .await;
        self.state
            .metrics
            .set_targets_monitored(TargetClass::Network, targets.len() as i64);
        info!(mode = %mode, targets = targets.len(), "Network targets reloaded");

        self.scheduler.trigger(TargetClass::Network);
        Ok(targets)
    }

    /// Re-read storage paths from the source
    pub async fn refresh_storage_paths(&self) -> usize {
        let _guard = self.control.lock().await;
        let config = self.state.config().await;
        let count = self.reload_storage_paths(&config).await;
        self.apply_schedule(&config).await;
        count
    }

    pub async fn set_paused(&self, paused: bool) {
        let _guard = self.control.lock().await;
        if self.state.set_paused(paused) == paused {
            return;
        }
        let config = self.state.config().await;
        self.apply_schedule(&config).await;
        info!(paused = paused, "Monitoring pause changed");
    }

    /// Apply an OS connectivity report
    pub fn report_connectivity(&self, online: bool) {
        if let Some(offline) = self.state.offline.set_os_connectivity(online) {
            self.state.metrics.set_offline(offline);
            self.state
                .logger
                .log_offline_changed(offline, self.state.offline.consecutive_failures());
        }
    }

    pub async fn status_snapshot(&self, class: TargetClass) -> Arc<HashMap<String, TargetStatus>> {
        self.state.store(class).snapshot().await
    }

    pub async fn alert_snapshot(&self) -> AlertSnapshot {
        let network = self.state.network_alert.lock().await.clone();
        let storage = self
            .state
            .storage_alerts
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        AlertSnapshot { network, storage }
    }

    pub fn is_offline(&self) -> bool {
        self.state.offline.is_offline()
    }

    pub fn subscribe_offline(&self) -> watch::Receiver<bool> {
        self.state.offline.subscribe()
    }

    pub async fn config(&self) -> Arc<Config> {
        self.state.config().await
    }

    pub async fn ticker_specs(&self) -> HashMap<TargetClass, TickerSpec> {
        self.scheduler.active_specs().await
    }

    pub async fn engine_snapshot(&self) -> EngineSnapshot {
        let config = self.state.config().await;
        let (average, level) = network_level(&self.state).await;

        EngineSnapshot {
            mode: config.mode,
            paused: self.state.is_paused(),
            offline: self.is_offline(),
            average_latency_ms: average,
            level,
            network: self.ordered_statuses(TargetClass::Network).await,
            storage: self.ordered_statuses(TargetClass::Storage).await,
            alerts: self.alert_snapshot().await,
            config: (*config).clone(),
        }
    }

    /// Statuses in target order
    pub async fn ordered_statuses(&self, class: TargetClass) -> Vec<TargetStatus> {
        let store = self.state.store(class);
        let targets = store.targets().await;
        let snapshot = store.snapshot().await;
        targets
            .iter()
            .map(|t| {
                snapshot
                    .get(t.id())
                    .cloned()
                    .unwrap_or_else(|| TargetStatus::new(t.clone()))
            })
            .collect()
    }

    /// Seed persisted history for configured targets
    pub async fn restore_history(&self, history: HashMap<String, Vec<Sample>>) -> usize {
        let now = self.state.now_ms();
        let mut restored = 0;
        for (id, samples) in history {
            for class in TargetClass::ALL {
                if self.state.store(class).restore_history(&id, samples.clone(), now).await {
                    restored += 1;
                    break;
                }
            }
        }
        restored
    }

    /// Copy the monitor's persisted state into `base`
    pub async fn export_settings(&self, mut base: SettingsFile) -> SettingsFile {
        base.config = (*self.state.config().await).clone();
        base.target_overrides = self.state.target_overrides.read().await.clone();
        let mut muted: Vec<String> = self.state.storage_muted.read().await.iter().cloned().collect();
        muted.sort();
        base.storage_muted = muted;

        let mut history = HashMap::new();
        for class in TargetClass::ALL {
            for (id, status) in self.state.store(class).snapshot().await.iter() {
                if !status.history.is_empty() {
                    history.insert(id.clone(), status.history.clone());
                }
            }
        }
        base.history = history;
        base
    }

    /// Latency history of every target as CSV, network targets first
    pub async fn history_csv(&self) -> Result<String, EngineError> {
        let mut statuses = self.ordered_statuses(TargetClass::Network).await;
        statuses.extend(self.ordered_statuses(TargetClass::Storage).await);
        export::history_csv(&statuses)
    }

    /// Adopt an imported settings document.
    ///
    /// Custom endpoints must already be installed in the catalog. History in
    /// the document is ignored.
    pub async fn import_settings(&self, settings: &SettingsFile) -> Result<Arc<Config>, EngineError> {
        settings.validate()?;
        *self.state.target_overrides.write().await = settings.target_overrides.clone();
        *self.state.storage_muted.write().await = settings.storage_muted.iter().cloned().collect();

        let installed = self.replace_config(settings.config.clone()).await?;
        let targets = self.reload_targets().await?;
        let storage = self.refresh_storage_paths().await;
        info!(
            network_targets = targets.len(),
            storage_paths = storage,
            "Settings imported"
        );
        Ok(installed)
    }

    async fn load_network_targets(&self, mode: Mode) -> Result<Vec<NetworkTarget>> {
        let mut targets = self.catalog.targets_for_mode(mode).await?;
        let overrides = self.state.target_overrides.read().await;
        for target in targets.iter_mut() {
            if let Some(o) = overrides.get(&target.id) {
                o.apply(target);
            }
        }
        Ok(targets)
    }

    /// Replace storage targets from the source; empty unless storage is active
    async fn reload_storage_paths(&self, config: &Config) -> usize {
        let paths = if config.storage_active() {
            match self.storage_source.list_storage_paths().await {
                Ok(paths) => paths,
                Err(e) => {
                    warn!(error = %e, "Failed to list storage paths, storage monitoring inactive");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let muted = self.state.storage_muted.read().await.clone();
        let targets: Vec<Target> = paths
            .into_iter()
            .map(|mut p| {
                p.muted = p.muted || muted.contains(&p.id);
                Target::Storage(p)
            })
            .collect();
        let count = targets.len();

        let ids: HashSet<String> = targets.iter().map(|t| t.id().to_string()).collect();
        self.state.storage_alerts.retain(|id, _| ids.contains(id));
        self.state
            .store(TargetClass::Storage)
            .replace_targets(targets)
            .await;
        self.state
            .metrics
            .set_targets_monitored(TargetClass::Storage, count as i64);
        count
    }

    async fn apply_schedule(&self, config: &Config) {
        let storage_paths = self.state.store(TargetClass::Storage).len().await;
        self.scheduler
            .reconfigure(config, self.state.is_paused(), storage_paths)
            .await;
    }

    fn spawn_run_all(&self, config: &Config) {
        self.scheduler.trigger(TargetClass::Network);
        if config.storage_active() {
            self.scheduler.trigger(TargetClass::Storage);
        }
    }
}

/// Builder for a [`Monitor`]
pub struct MonitorBuilder {
    config: Config,
    executor: Option<Arc<dyn ProbeExecutor>>,
    notifier: Option<Arc<dyn Notifier>>,
    catalog: Option<Arc<dyn TargetCatalog>>,
    sink: Arc<dyn StatusSink>,
    storage_source: Arc<dyn StoragePathSource>,
    clock: Arc<dyn Clock>,
    retry_policy: RetryPolicy,
    health: HealthRegistry,
    node_name: String,
    overrides: HashMap<String, TargetOverride>,
    storage_muted: HashSet<String>,
}

impl MonitorBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            executor: None,
            notifier: None,
            catalog: None,
            sink: Arc::new(NullStatusSink),
            storage_source: Arc::new(NoStoragePaths),
            clock: Arc::new(SystemClock),
            retry_policy: RetryPolicy::default(),
            health: HealthRegistry::new(),
            node_name: "localhost".to_string(),
            overrides: HashMap::new(),
            storage_muted: HashSet::new(),
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn executor(mut self, executor: Arc<dyn ProbeExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn catalog(mut self, catalog: Arc<dyn TargetCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn storage_source(mut self, source: Arc<dyn StoragePathSource>) -> Self {
        self.storage_source = source;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn node_name(mut self, name: impl Into<String>) -> Self {
        self.node_name = name.into();
        self
    }

    /// Seed target overrides and storage mutes from persisted settings
    pub fn settings(mut self, settings: &SettingsFile) -> Self {
        self.config = settings.config.clone();
        self.overrides = settings.target_overrides.clone();
        self.storage_muted = settings.storage_muted.iter().cloned().collect();
        self
    }

    pub fn build(self) -> Result<Monitor> {
        let executor = self
            .executor
            .ok_or_else(|| anyhow::anyhow!("Probe executor is required"))?;
        let notifier = self
            .notifier
            .ok_or_else(|| anyhow::anyhow!("Notifier is required"))?;
        let catalog = self
            .catalog
            .ok_or_else(|| anyhow::anyhow!("Target catalog is required"))?;
        self.config.validate()?;

        let mut state = EngineState::new(self.config, self.clock, self.node_name);
        state.target_overrides = tokio::sync::RwLock::new(self.overrides);
        state.storage_muted = tokio::sync::RwLock::new(self.storage_muted);
        let state = Arc::new(state);

        let invoker = Invoker::new(self.retry_policy);
        let dispatcher = AlertDispatcher::new(
            state.clone(),
            notifier,
            invoker.clone(),
            self.health.clone(),
        );
        let runner = BatchRunner::new(
            state.clone(),
            executor,
            self.sink,
            dispatcher.clone(),
            invoker,
            self.health.clone(),
        );

        Ok(Monitor {
            state,
            scheduler: Scheduler::new(runner),
            dispatcher,
            catalog,
            storage_source: self.storage_source,
            health: self.health,
            control: Mutex::new(()),
        })
    }
}

impl Default for MonitorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
