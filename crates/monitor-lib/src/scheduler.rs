//! Periodic and ad-hoc batch triggering
//!
//! One ticker task per target class. A ticker never awaits its batch: each
//! tick spawns one and the runner's single-flight slot absorbs overlaps.
//! Tickers are only torn down and recreated when their spec changes.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::health::components;
use crate::models::{Config, TargetClass};
use crate::runner::{BatchRun, BatchRunner};

/// Desired shape of one class ticker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickerSpec {
    pub period: Duration,
    pub enabled: bool,
}

impl TickerSpec {
    /// Compute the ticker spec for `class` from the current settings
    pub fn for_class(class: TargetClass, config: &Config, paused: bool, storage_paths: usize) -> Self {
        let enabled = !paused
            && match class {
                TargetClass::Network => true,
                TargetClass::Storage => config.storage_active() && storage_paths > 0,
            };
        Self {
            period: config.interval_for(class),
            enabled,
        }
    }
}

struct Ticker {
    spec: TickerSpec,
    shutdown: broadcast::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    async fn stop(mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

pub struct Scheduler {
    runner: BatchRunner,
    tickers: Mutex<HashMap<TargetClass, Ticker>>,
}

impl Scheduler {
    pub fn new(runner: BatchRunner) -> Self {
        Self {
            runner,
            tickers: Mutex::new(HashMap::new()),
        }
    }

    pub fn runner(&self) -> &BatchRunner {
        &self.runner
    }

    /// Bring tickers in line with the settings.
    ///
    /// Returns the classes whose ticker was restarted or stopped.
    pub async fn reconfigure(&self, config: &Config, paused: bool, storage_paths: usize) -> Vec<TargetClass> {
        let mut changed = Vec::new();
        let mut tickers = self.tickers.lock().await;

        for class in TargetClass::ALL {
            let desired = TickerSpec::for_class(class, config, paused, storage_paths);
            let current = tickers.get(&class).map(|t| t.spec);

            match current {
                Some(spec) if spec == desired => continue,
                None if !desired.enabled => continue,
                _ => {}
            }

            if let Some(old) = tickers.remove(&class) {
                old.stop().await;
            }
            if desired.enabled {
                tickers.insert(class, self.spawn_ticker(class, desired));
                info!(
                    class = %class,
                    period_secs = desired.period.as_secs(),
                    "Ticker started"
                );
            } else {
                info!(class = %class, "Ticker stopped");
            }
            changed.push(class);
        }
        changed
    }

    fn spawn_ticker(&self, class: TargetClass, spec: TickerSpec) -> Ticker {
        let (shutdown, mut shutdown_rx) = broadcast::channel(1);
        let runner = self.runner.clone();
        let period = spec.period;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        spawn_batch(runner.clone(), class);
                    }
                    _ = shutdown_rx.recv() => {
                        debug!(class = %class, "Ticker shutting down");
                        break;
                    }
                }
            }
        });

        Ticker {
            spec,
            shutdown,
            handle: Some(handle),
        }
    }

    /// Run a batch of `class` now; `None` if the batch task died
    pub fn trigger(&self, class: TargetClass) -> JoinHandle<Option<BatchRun>> {
        spawn_batch(self.runner.clone(), class)
    }

    /// Run both classes now and wait for them
    pub async fn trigger_all(&self, storage_active: bool) -> Vec<BatchRun> {
        let mut handles = vec![self.trigger(TargetClass::Network)];
        if storage_active {
            handles.push(self.trigger(TargetClass::Storage));
        }

        let mut runs = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(Some(run)) = handle.await {
                runs.push(run);
            }
        }
        runs
    }

    pub async fn active_specs(&self) -> HashMap<TargetClass, TickerSpec> {
        self.tickers
            .lock()
            .await
            .iter()
            .map(|(class, t)| (*class, t.spec))
            .collect()
    }

    pub async fn shutdown(&self) {
        let mut tickers = self.tickers.lock().await;
        for (_, ticker) in tickers.drain() {
            ticker.stop().await;
        }
        info!("Scheduler stopped");
    }
}

/// Run one batch in its own task and watch it.
///
/// A batch task that panics leaves its class's in-flight slot taken, so the
/// probes component is marked unhealthy until a later batch completes.
fn spawn_batch(runner: BatchRunner, class: TargetClass) -> JoinHandle<Option<BatchRun>> {
    tokio::spawn(async move {
        let batch = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.run_batch(class).await })
        };
        match batch.await {
            Ok(run) => Some(run),
            Err(e) => {
                error!(class = %class, error = %e, "Batch task ended unexpectedly");
                runner
                    .health()
                    .set_unhealthy(components::probes(class), format!("batch task failed: {}", e))
                    .await;
                None
            }
        }
    })
}
