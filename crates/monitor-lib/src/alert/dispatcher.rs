//! Drives alert gates after each completed batch and sends notifications

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::compose;
use super::gate::{AlertPolicy, GateDecision};
use crate::health::{components, HealthRegistry};
use crate::invoker::{CallSite, Invoker};
use crate::models::{Config, Probed, Target, TargetClass};
use crate::probe::Notifier;
use crate::state::EngineState;
use crate::status::{average_latency, classify, TargetStatus};

/// Alert group key of the aggregate network group
pub const NETWORK_GROUP: &str = "network";

/// What happened to one alert group for one batch
#[derive(Debug, Clone, PartialEq)]
pub struct GroupReport {
    pub group: String,
    pub decision: GateDecision,
    pub delivered: Option<bool>,
}

#[derive(Clone)]
pub struct AlertDispatcher {
    state: Arc<EngineState>,
    notifier: Arc<dyn Notifier>,
    invoker: Invoker,
    health: HealthRegistry,
}

impl AlertDispatcher {
    pub fn new(
        state: Arc<EngineState>,
        notifier: Arc<dyn Notifier>,
        invoker: Invoker,
        health: HealthRegistry,
    ) -> Self {
        Self {
            state,
            notifier,
            invoker,
            health,
        }
    }

    /// Evaluate the alert groups of `class` for a completed batch
    pub async fn on_batch_completed(&self, class: TargetClass, batch_seq: u64) -> Vec<GroupReport> {
        let config = self.state.config().await;
        if !config.notifications_enabled {
            self.reset_groups(class).await;
            return Vec::new();
        }

        match class {
            TargetClass::Network => self
                .evaluate_network(&config, batch_seq)
                .await
                .into_iter()
                .collect(),
            TargetClass::Storage => self.evaluate_storage(&config, batch_seq).await,
        }
    }

    /// Drop breach streaks for every group of `class`
    pub async fn reset_groups(&self, class: TargetClass) {
        match class {
            TargetClass::Network => self.state.network_alert.lock().await.reset(),
            TargetClass::Storage => {
                for mut entry in self.state.storage_alerts.iter_mut() {
                    entry.value_mut().reset();
                }
            }
        }
    }

    async fn evaluate_network(&self, config: &Config, batch_seq: u64) -> Option<GroupReport> {
        let store = self.state.store(TargetClass::Network);
        let targets = store.targets().await;
        let snapshot = store.snapshot().await;
        let ordered: Vec<&TargetStatus> = targets
            .iter()
            .filter_map(|t| snapshot.get(t.id()))
            .collect();

        let average = match average_latency(ordered.iter().copied()) {
            Some(avg) => avg,
            // the streak neither advances nor resets
            None => {
                debug!(batch_seq = batch_seq, "No latency in batch, skipping network alert evaluation");
                return None;
            }
        };
        let average_level = classify(Some(average), &config.thresholds);
        let breach = ordered
            .iter()
            .any(|s| compose::alertable(s) && s.level.is_breach());

        let policy = AlertPolicy::new(config.alert_threshold, config.alert_cooldown_min);
        let now = self.state.now_ms();
        let decision = {
            let mut gate = self.state.network_alert.lock().await;
            gate.observe(batch_seq, breach, now, &policy)
        };

        let delivered = if let GateDecision::Fire { breaches } = decision {
            let title = compose::network_title(average_level);
            let body = compose::network_body(average, average_level, ordered.iter().copied());
            let ok = self.send(NETWORK_GROUP, title, &body, breaches).await;

            let mut gate = self.state.network_alert.lock().await;
            if ok {
                gate.confirm_sent(self.state.now_ms());
            } else {
                gate.send_failed();
            }
            Some(ok)
        } else {
            self.note_suppressed(NETWORK_GROUP, &decision);
            None
        };

        Some(GroupReport {
            group: NETWORK_GROUP.to_string(),
            decision,
            delivered,
        })
    }

    async fn evaluate_storage(&self, config: &Config, batch_seq: u64) -> Vec<GroupReport> {
        let store = self.state.store(TargetClass::Storage);
        let targets = store.targets().await;
        let snapshot = store.snapshot().await;
        let policy = AlertPolicy::new(
            config.storage_alert_threshold,
            config.storage_alert_cooldown_min,
        );

        let live: HashSet<&str> = targets.iter().map(|t| t.id()).collect();
        self.state
            .storage_alerts
            .retain(|id, _| live.contains(id.as_str()));

        let mut reports = Vec::with_capacity(targets.len());
        for target in targets.iter() {
            let path = match target {
                Target::Storage(p) => p,
                Target::Network(_) => continue,
            };
            let status = match snapshot.get(&path.id) {
                Some(s) => s,
                None => continue,
            };
            let breach = !path.muted && status.is_failed();

            let now = self.state.now_ms();
            // Entry guard dropped before any await
            let decision = self
                .state
                .storage_alerts
                .entry(path.id.clone())
                .or_default()
                .observe(batch_seq, breach, now, &policy);

            let delivered = if let GateDecision::Fire { breaches } = decision {
                let body = compose::storage_body(path, status);
                let ok = self.send(&path.id, compose::STORAGE_TITLE, &body, breaches).await;

                if let Some(mut gate) = self.state.storage_alerts.get_mut(&path.id) {
                    if ok {
                        gate.confirm_sent(self.state.now_ms());
                    } else {
                        gate.send_failed();
                    }
                }
                Some(ok)
            } else {
                self.note_suppressed(&path.id, &decision);
                None
            };

            reports.push(GroupReport {
                group: path.id.clone(),
                decision,
                delivered,
            });
        }
        reports
    }

    async fn send(&self, group: &str, title: &str, body: &str, breaches: u32) -> bool {
        let notifier = self.notifier.clone();
        let result = self
            .invoker
            .invoke(CallSite::Notification, || {
                let notifier = notifier.clone();
                let title = title.to_string();
                let body = body.to_string();
                async move { notifier.notify(&title, &body).await }
            })
            .await;

        match result {
            Ok(()) => {
                self.state.metrics.inc_notification("sent");
                self.state.logger.log_alert_sent(group, title, breaches);
                self.health.set_healthy(components::NOTIFIER).await;
                true
            }
            Err(e) => {
                self.state.metrics.inc_notification("failed");
                warn!(group = %group, error = %e, "Notification delivery failed");
                self.health
                    .set_degraded(components::NOTIFIER, e.to_string())
                    .await;
                false
            }
        }
    }

    fn note_suppressed(&self, group: &str, decision: &GateDecision) {
        match decision {
            GateDecision::CoolingDown { remaining_ms } => {
                self.state.logger.log_alert_suppressed(group, "cooldown");
                debug!(group = %group, remaining_ms = remaining_ms, "Alert cooling down");
            }
            GateDecision::SendInFlight => {
                self.state.logger.log_alert_suppressed(group, "send_in_flight");
            }
            GateDecision::Degrading(n) => {
                info!(group = %group, consecutive_breaches = n, "Degradation detected");
            }
            _ => {}
        }
    }
}
