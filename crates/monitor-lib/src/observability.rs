//! Observability infrastructure for the latency monitor
//!
//! Provides:
//! - Prometheus metrics (batch duration, probe results, alert delivery, retries)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge, register_histogram_vec, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Gauge, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::models::{Level, Mode, TargetClass};

/// Histogram buckets for batch duration (in seconds)
const BATCH_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    batch_duration_seconds: HistogramVec,
    probes_total: IntCounterVec,
    probe_failures_total: IntCounterVec,
    stale_outcomes_total: IntCounterVec,
    batches_skipped_total: IntCounterVec,
    notifications_total: IntCounterVec,
    invoke_retries_total: IntCounterVec,
    targets_monitored: IntGaugeVec,
    average_latency_ms: Gauge,
    status_level: IntGauge,
    offline: IntGauge,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            batch_duration_seconds: register_histogram_vec!(
                "pulsewatch_batch_duration_seconds",
                "Wall time of a probe batch from start to last settled probe",
                &["class"],
                BATCH_BUCKETS.to_vec()
            )
            .expect("Failed to register batch_duration_seconds"),

            probes_total: register_int_counter_vec!(
                "pulsewatch_probes_total",
                "Probe outcomes applied to target status",
                &["class", "result"]
            )
            .expect("Failed to register probes_total"),

            probe_failures_total: register_int_counter_vec!(
                "pulsewatch_probe_failures_total",
                "Failed probes by error kind",
                &["class", "kind"]
            )
            .expect("Failed to register probe_failures_total"),

            stale_outcomes_total: register_int_counter_vec!(
                "pulsewatch_stale_outcomes_total",
                "Probe outcomes discarded because the target set changed",
                &["class"]
            )
            .expect("Failed to register stale_outcomes_total"),

            batches_skipped_total: register_int_counter_vec!(
                "pulsewatch_batches_skipped_total",
                "Batches skipped because one was already in flight",
                &["class"]
            )
            .expect("Failed to register batches_skipped_total"),

            notifications_total: register_int_counter_vec!(
                "pulsewatch_notifications_total",
                "Notification deliveries by result",
                &["result"]
            )
            .expect("Failed to register notifications_total"),

            invoke_retries_total: register_int_counter_vec!(
                "pulsewatch_invoke_retries_total",
                "Retries performed by the resilient invoker",
                &["call_site"]
            )
            .expect("Failed to register invoke_retries_total"),

            targets_monitored: register_int_gauge_vec!(
                "pulsewatch_targets_monitored",
                "Number of enabled targets per class",
                &["class"]
            )
            .expect("Failed to register targets_monitored"),

            average_latency_ms: register_gauge!(
                "pulsewatch_average_latency_ms",
                "Average latency of the last network batch"
            )
            .expect("Failed to register average_latency_ms"),

            status_level: register_int_gauge!(
                "pulsewatch_status_level",
                "Level of the average latency (0 unknown .. 4 critical)"
            )
            .expect("Failed to register status_level"),

            offline: register_int_gauge!(
                "pulsewatch_offline",
                "1 when the monitor considers the host offline"
            )
            .expect("Failed to register offline"),
        }
    }
}

/// Monitor metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new)
    }

    pub fn observe_batch_duration(&self, class: TargetClass, duration_secs: f64) {
        self.inner()
            .batch_duration_seconds
            .with_label_values(&[class.as_str()])
            .observe(duration_secs);
    }

    pub fn inc_probe(&self, class: TargetClass, success: bool) {
        let result = if success { "success" } else { "failure" };
        self.inner()
            .probes_total
            .with_label_values(&[class.as_str(), result])
            .inc();
    }

    pub fn inc_probe_failure(&self, class: TargetClass, kind: &str) {
        self.inner()
            .probe_failures_total
            .with_label_values(&[class.as_str(), kind])
            .inc();
    }

    pub fn inc_stale_outcome(&self, class: TargetClass) {
        self.inner()
            .stale_outcomes_total
            .with_label_values(&[class.as_str()])
            .inc();
    }

    pub fn inc_batch_skipped(&self, class: TargetClass) {
        self.inner()
            .batches_skipped_total
            .with_label_values(&[class.as_str()])
            .inc();
    }

    /// `result` is one of `sent`, `failed`
    pub fn inc_notification(&self, result: &str) {
        self.inner()
            .notifications_total
            .with_label_values(&[result])
            .inc();
    }

    pub fn inc_invoke_retries(&self, call_site: &str) {
        self.inner()
            .invoke_retries_total
            .with_label_values(&[call_site])
            .inc();
    }

    pub fn set_targets_monitored(&self, class: TargetClass, count: i64) {
        self.inner()
            .targets_monitored
            .with_label_values(&[class.as_str()])
            .set(count);
    }

    pub fn set_status(&self, average_ms: f64, level: Level) {
        self.inner().average_latency_ms.set(average_ms);
        self.inner().status_level.set(level.severity() as i64);
    }

    pub fn set_offline(&self, offline: bool) {
        self.inner().offline.set(if offline { 1 } else { 0 });
    }
}

/// Structured logger for monitor events
///
/// Emits event-shaped records with a consistent `event` field so log
/// pipelines can filter on it.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn log_batch_completed(
        &self,
        class: TargetClass,
        batch_seq: u64,
        probed: usize,
        failed: usize,
        stale: usize,
        duration_ms: u64,
    ) {
        debug!(
            event = "batch_completed",
            node = %self.node_name,
            class = %class,
            batch_seq = batch_seq,
            probed = probed,
            failed = failed,
            stale = stale,
            duration_ms = duration_ms,
            "Probe batch completed"
        );
    }

    pub fn log_alert_sent(&self, group: &str, title: &str, breaches: u32) {
        warn!(
            event = "alert_sent",
            node = %self.node_name,
            group = %group,
            title = %title,
            consecutive_breaches = breaches,
            "Alert notification sent"
        );
    }

    pub fn log_alert_suppressed(&self, group: &str, reason: &str) {
        debug!(
            event = "alert_suppressed",
            node = %self.node_name,
            group = %group,
            reason = %reason,
            "Alert suppressed"
        );
    }

    pub fn log_offline_changed(&self, offline: bool, consecutive_failures: u32) {
        if offline {
            warn!(
                event = "offline_changed",
                node = %self.node_name,
                offline = true,
                consecutive_failures = consecutive_failures,
                "Host appears offline"
            );
        } else {
            info!(
                event = "offline_changed",
                node = %self.node_name,
                offline = false,
                "Host is back online"
            );
        }
    }

    pub fn log_mode_switched(&self, from: Mode, to: Mode, targets: usize) {
        info!(
            event = "mode_switched",
            node = %self.node_name,
            from = %from,
            to = %to,
            targets = targets,
            "Monitoring mode switched"
        );
    }

    pub fn log_startup(&self, version: &str, mode: Mode, network_targets: usize, storage_paths: usize) {
        info!(
            event = "monitor_started",
            node = %self.node_name,
            version = %version,
            mode = %mode,
            network_targets = network_targets,
            storage_paths = storage_paths,
            "Latency monitor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Latency monitor shutting down"
        );
    }
}
