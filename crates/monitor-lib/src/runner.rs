//! Probe batch runner
//!
//! A batch probes every enabled target of one class concurrently. Outcomes
//! are applied as they settle, unless the target set was replaced while the
//! probe ran. Only one batch per class and target generation is in flight.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::alert::{AlertDispatcher, GroupReport};
use crate::health::{components, HealthRegistry};
use crate::invoker::{CallSite, Invoker};
use crate::models::{Level, ProbeOutcome, Probed, Target, TargetClass};
use crate::probe::{ProbeExecutor, StatusSink};
use crate::state::EngineState;
use crate::status::{average_latency, classify, ApplyResult};

/// Outcome of a `run_batch` call
#[derive(Debug, Clone, PartialEq)]
pub enum BatchRun {
    /// A batch for this class was already in flight
    Skipped,
    /// The target set was replaced while probing; nothing was applied or evaluated
    Superseded { class: TargetClass, stale: usize },
    Completed(BatchSummary),
}

impl BatchRun {
    pub fn summary(&self) -> Option<&BatchSummary> {
        match self {
            BatchRun::Completed(summary) => Some(summary),
            BatchRun::Skipped | BatchRun::Superseded { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub class: TargetClass,
    pub batch_seq: u64,
    pub generation: u64,
    pub probed: usize,
    pub failed: usize,
    pub stale: usize,
    pub average_ms: Option<f64>,
    pub alerts: Vec<GroupReport>,
}

#[derive(Clone)]
pub struct BatchRunner {
    state: Arc<EngineState>,
    executor: Arc<dyn ProbeExecutor>,
    sink: Arc<dyn StatusSink>,
    dispatcher: AlertDispatcher,
    invoker: Invoker,
    health: HealthRegistry,
}

impl BatchRunner {
    pub fn new(
        state: Arc<EngineState>,
        executor: Arc<dyn ProbeExecutor>,
        sink: Arc<dyn StatusSink>,
        dispatcher: AlertDispatcher,
        invoker: Invoker,
        health: HealthRegistry,
    ) -> Self {
        Self {
            state,
            executor,
            sink,
            dispatcher,
            invoker,
            health,
        }
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub async fn run_batch(&self, class: TargetClass) -> BatchRun {
        let class_state = self.state.class(class);
        let (generation, targets) = class_state.store.enabled_targets().await;

        if !class_state.in_flight.try_acquire(generation) {
            debug!(class = %class, generation = generation, "Batch already in flight, skipping");
            self.state.metrics.inc_batch_skipped(class);
            return BatchRun::Skipped;
        }

        let started = Instant::now();
        self.state.metrics.set_targets_monitored(class, targets.len() as i64);
        class_state.store.mark_loading(generation, &targets).await;

        let mut probes = JoinSet::new();
        for target in targets.iter().cloned() {
            let executor = self.executor.clone();
            let invoker = self.invoker.clone();
            let state = self.state.clone();
            probes.spawn(async move { probe_target(&state, &invoker, executor, target).await });
        }

        let mut failed = 0;
        let mut stale = 0;
        while let Some(joined) = probes.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(class = %class, error = %e, "Probe task aborted");
                    failed += 1;
                    continue;
                }
            };
            if !outcome.success {
                failed += 1;
            }
            if !self.apply_outcome(class, generation, &outcome).await {
                stale += 1;
            }
        }

        // outcomes of a replaced target set never reach the gate, sink or health
        let released = class_state.in_flight.release(generation);
        if !released || class_state.store.generation().await != generation {
            info!(
                class = %class,
                generation = generation,
                stale = stale,
                "Batch superseded by a newer target set"
            );
            return BatchRun::Superseded { class, stale };
        }
        let ids: Vec<String> = targets.iter().map(|t| t.id().to_string()).collect();
        class_state.store.clear_loading(generation, &ids).await;

        let batch_seq = class_state.next_batch_seq();
        let elapsed = started.elapsed();
        self.state
            .metrics
            .observe_batch_duration(class, elapsed.as_secs_f64());
        self.state.logger.log_batch_completed(
            class,
            batch_seq,
            targets.len(),
            failed,
            stale,
            elapsed.as_millis() as u64,
        );
        self.health.record_batch(class, targets.len(), failed).await;

        let average_ms = match class {
            TargetClass::Network => self.publish_status().await,
            TargetClass::Storage => None,
        };
        let alerts = self.dispatcher.on_batch_completed(class, batch_seq).await;

        BatchRun::Completed(BatchSummary {
            class,
            batch_seq,
            generation,
            probed: targets.len(),
            failed,
            stale,
            average_ms,
            alerts,
        })
    }

    /// Returns false if the outcome was discarded as stale
    async fn apply_outcome(&self, class: TargetClass, generation: u64, outcome: &ProbeOutcome) -> bool {
        let config = self.state.config().await;
        match self
            .state
            .store(class)
            .apply(generation, outcome, &config.thresholds)
            .await
        {
            ApplyResult::Applied(_) => {
                self.state.metrics.inc_probe(class, outcome.success);
                if let Some(kind) = outcome.error_kind {
                    self.state.metrics.inc_probe_failure(class, kind.as_str());
                }
                if let Some(offline) = self.state.offline.record(outcome.success) {
                    self.state.metrics.set_offline(offline);
                    self.state
                        .logger
                        .log_offline_changed(offline, self.state.offline.consecutive_failures());
                }
                true
            }
            ApplyResult::Stale => {
                debug!(
                    class = %class,
                    target_id = %outcome.target_id,
                    generation = generation,
                    "Discarding stale probe outcome"
                );
                self.state.metrics.inc_stale_outcome(class);
                false
            }
        }
    }

    /// Push the network average to the status sink without waiting on it
    async fn publish_status(&self) -> Option<f64> {
        let (average, level) = network_level(&self.state).await;
        let average = average?;
        let thresholds = self.state.config().await.thresholds;

        let sink = self.sink.clone();
        let invoker = self.invoker.clone();
        let health = self.health.clone();
        tokio::spawn(async move {
            let result = invoker
                .invoke(CallSite::StatusSink, || {
                    let sink = sink.clone();
                    async move { sink.publish(average, level, &thresholds).await }
                })
                .await;

            match result {
                Ok(()) => health.set_healthy(components::STATUS_SINK).await,
                Err(e) => {
                    health
                        .set_degraded(components::STATUS_SINK, e.to_string())
                        .await
                }
            }
        });
        Some(average)
    }
}

async fn probe_target(
    state: &EngineState,
    invoker: &Invoker,
    executor: Arc<dyn ProbeExecutor>,
    target: Target,
) -> ProbeOutcome {
    let hostname = target.hostname().to_string();
    let port = target.port();
    let protocol = target.protocol();

    let result = invoker
        .invoke(CallSite::Probe, || {
            let executor = executor.clone();
            let hostname = hostname.clone();
            async move { executor.probe(&hostname, port, protocol).await }
        })
        .await;

    let now = state.now_ms();
    match result {
        Ok(latency) => ProbeOutcome::success(target.id(), now, latency),
        Err(e) => {
            debug!(
                target_id = %target.id(),
                hostname = %hostname,
                error = %e.message,
                "Probe failed"
            );
            ProbeOutcome::failure(target.id(), now, e.message)
        }
    }
}

/// Level of the network average, `Unknown` when no target has a latency
pub async fn network_level(state: &EngineState) -> (Option<f64>, Level) {
    let snapshot = state.store(TargetClass::Network).snapshot().await;
    let average = average_latency(snapshot.values());
    let thresholds = state.config().await.thresholds;
    (average, classify(average, &thresholds))
}
