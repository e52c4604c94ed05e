//! Per-target health status
//!
//! Each target class owns a [`StatusStore`] holding the current target set,
//! its generation and the status map. The status map is copy-on-write:
//! readers clone the `Arc` and never see a half-applied update.

pub mod classify;
pub mod history;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::ProbeErrorKind;
use crate::models::{LatencyThresholds, Level, ProbeErrorInfo, ProbeOutcome, Probed, Sample, Target};

pub use classify::classify;

/// Observable state of one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetStatus {
    pub target: Target,
    pub current_latency: Option<f64>,
    pub level: Level,
    pub last_updated_ms: Option<i64>,
    pub history: Vec<Sample>,
    pub last_error: Option<ProbeErrorInfo>,
    pub is_loading: bool,
    pub consecutive_failures: u32,
}

impl TargetStatus {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            current_latency: None,
            level: Level::Unknown,
            last_updated_ms: None,
            history: Vec::new(),
            last_error: None,
            is_loading: false,
            consecutive_failures: 0,
        }
    }

    pub fn record_success(&mut self, now_ms: i64, latency_ms: f64, thresholds: &LatencyThresholds) {
        self.current_latency = Some(latency_ms);
        self.level = classify(Some(latency_ms), thresholds);
        self.last_updated_ms = Some(now_ms);
        self.last_error = None;
        self.consecutive_failures = 0;
        history::append(&mut self.history, now_ms, latency_ms);
    }

    /// Failures never touch the history
    pub fn record_failure(&mut self, now_ms: i64, kind: ProbeErrorKind, message: impl Into<String>) {
        self.current_latency = None;
        self.level = Level::Unknown;
        self.last_updated_ms = Some(now_ms);
        self.last_error = Some(ProbeErrorInfo {
            kind,
            message: message.into(),
            user_message: kind.user_message().to_string(),
            timestamp_ms: now_ms,
        });
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        history::prune(&mut self.history, now_ms);
    }

    pub fn apply(&mut self, outcome: &ProbeOutcome, thresholds: &LatencyThresholds) {
        match (outcome.success, outcome.latency_ms) {
            (true, Some(latency)) => {
                self.record_success(outcome.timestamp_ms, latency, thresholds)
            }
            _ => {
                let kind = outcome.error_kind.unwrap_or(ProbeErrorKind::Unknown);
                let message = outcome.raw_message.clone().unwrap_or_default();
                self.record_failure(outcome.timestamp_ms, kind, message)
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        self.last_error.is_some() && self.current_latency.is_none()
    }
}

/// Mean of the current latencies of enabled targets, `None` if none has one
pub fn average_latency<'a, I>(statuses: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a TargetStatus>,
{
    let (sum, count) = statuses
        .into_iter()
        .filter(|s| s.target.enabled())
        .filter_map(|s| s.current_latency)
        .filter(|l| *l > 0.0)
        .fold((0.0, 0usize), |(sum, count), l| (sum + l, count + 1));

    (count > 0).then(|| sum / count as f64)
}

/// Result of applying an outcome to the store
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyResult {
    Applied(TargetStatus),
    /// Target left the set or the set was replaced while the probe ran
    Stale,
}

#[derive(Debug, Default)]
struct StoreInner {
    generation: u64,
    targets: Arc<Vec<Target>>,
    statuses: Arc<HashMap<String, TargetStatus>>,
}

/// Target set and status map for one target class
#[derive(Debug, Default)]
pub struct StatusStore {
    inner: RwLock<StoreInner>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn generation(&self) -> u64 {
        self.inner.read().await.generation
    }

    pub async fn targets(&self) -> Arc<Vec<Target>> {
        self.inner.read().await.targets.clone()
    }

    /// Targets that are probed, along with the current generation
    pub async fn enabled_targets(&self) -> (u64, Vec<Target>) {
        let inner = self.inner.read().await;
        let targets = inner
            .targets
            .iter()
            .filter(|t| t.enabled())
            .cloned()
            .collect();
        (inner.generation, targets)
    }

    pub async fn snapshot(&self) -> Arc<HashMap<String, TargetStatus>> {
        self.inner.read().await.statuses.clone()
    }

    pub async fn get(&self, id: &str) -> Option<TargetStatus> {
        self.inner.read().await.statuses.get(id).cloned()
    }

    /// Replace the whole target set.
    ///
    /// Bumps the generation so in-flight outcomes are discarded, and drops
    /// statuses whose target is no longer configured. Returns the new
    /// generation.
    pub async fn replace_targets(&self, targets: Vec<Target>) -> u64 {
        let mut inner = self.inner.write().await;
        let ids: HashSet<&str> = targets.iter().map(|t| t.id()).collect();

        let statuses = Arc::make_mut(&mut inner.statuses);
        statuses.retain(|id, _| ids.contains(id.as_str()));
        // no batch of the new generation has started yet
        for target in &targets {
            if let Some(status) = statuses.get_mut(target.id()) {
                status.target = target.clone();
                status.is_loading = false;
            }
        }

        inner.targets = Arc::new(targets);
        inner.generation += 1;
        inner.generation
    }

    /// Update a single target in place without changing the generation
    pub async fn update_target<F>(&self, id: &str, f: F) -> Option<Target>
    where
        F: FnOnce(&mut Target),
    {
        let mut inner = self.inner.write().await;
        let index = inner.targets.iter().position(|t| t.id() == id)?;

        let targets = Arc::make_mut(&mut inner.targets);
        f(&mut targets[index]);
        let updated = targets[index].clone();

        if let Some(status) = Arc::make_mut(&mut inner.statuses).get_mut(id) {
            status.target = updated.clone();
        }
        Some(updated)
    }

    /// Mark targets as loading, creating statuses on first sight
    pub async fn mark_loading(&self, generation: u64, targets: &[Target]) {
        let mut inner = self.inner.write().await;
        if inner.generation != generation {
            return;
        }
        let statuses = Arc::make_mut(&mut inner.statuses);
        for target in targets {
            statuses
                .entry(target.id().to_string())
                .or_insert_with(|| TargetStatus::new(target.clone()))
                .is_loading = true;
        }
    }

    pub async fn clear_loading(&self, generation: u64, ids: &[String]) {
        let mut inner = self.inner.write().await;
        if inner.generation != generation {
            return;
        }
        if !ids
            .iter()
            .any(|id| inner.statuses.get(id).map(|s| s.is_loading).unwrap_or(false))
        {
            return;
        }
        let statuses = Arc::make_mut(&mut inner.statuses);
        for id in ids {
            if let Some(status) = statuses.get_mut(id) {
                status.is_loading = false;
            }
        }
    }

    /// Apply an outcome if its target still exists in the same generation
    pub async fn apply(
        &self,
        generation: u64,
        outcome: &ProbeOutcome,
        thresholds: &LatencyThresholds,
    ) -> ApplyResult {
        let mut inner = self.inner.write().await;
        if inner.generation != generation {
            return ApplyResult::Stale;
        }
        let target = match inner.targets.iter().find(|t| t.id() == outcome.target_id) {
            Some(t) => t.clone(),
            None => return ApplyResult::Stale,
        };

        let status = Arc::make_mut(&mut inner.statuses)
            .entry(outcome.target_id.clone())
            .or_insert_with(|| TargetStatus::new(target));
        status.apply(outcome, thresholds);
        ApplyResult::Applied(status.clone())
    }

    /// Recompute levels after a threshold change
    pub async fn reclassify(&self, thresholds: &LatencyThresholds) {
        let mut inner = self.inner.write().await;
        for status in Arc::make_mut(&mut inner.statuses).values_mut() {
            if status.current_latency.is_some() {
                status.level = classify(status.current_latency, thresholds);
            }
        }
    }

    /// Seed history for a configured target, pruning to the retention window
    pub async fn restore_history(&self, id: &str, mut samples: Vec<Sample>, now_ms: i64) -> bool {
        let mut inner = self.inner.write().await;
        let target = match inner.targets.iter().find(|t| t.id() == id) {
            Some(t) => t.clone(),
            None => return false,
        };
        samples.sort_by_key(|s| s.timestamp_ms);
        history::prune(&mut samples, now_ms);

        let status = Arc::make_mut(&mut inner.statuses)
            .entry(id.to_string())
            .or_insert_with(|| TargetStatus::new(target));
        status.history = samples;
        true
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.targets.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
