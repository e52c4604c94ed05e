//! Per-group alert state machine
//!
//! `Healthy -> Degrading(n) -> Alerting`, where alerting fires once the
//! breach streak reaches the threshold and then holds for the cooldown.
//! The gate is evaluated exactly once per completed batch.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Threshold and cooldown for one alert group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertPolicy {
    pub threshold: u32,
    pub cooldown: Duration,
}

impl AlertPolicy {
    pub fn new(threshold: u32, cooldown_min: u64) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown: Duration::from_secs(cooldown_min.saturating_mul(60)),
        }
    }

    fn cooldown_ms(&self) -> i64 {
        i64::try_from(self.cooldown.as_millis()).unwrap_or(i64::MAX)
    }
}

/// What the gate decided for one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Batch already evaluated
    Duplicate,
    Healthy,
    Degrading(u32),
    CoolingDown { remaining_ms: i64 },
    SendInFlight,
    /// Caller must send and then call `confirm_sent` or `send_failed`
    Fire { breaches: u32 },
}

impl GateDecision {
    pub fn should_fire(&self) -> bool {
        matches!(self, GateDecision::Fire { .. })
    }
}

/// Alert bookkeeping for one group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertState {
    pub consecutive_breaches: u32,
    pub last_notified_at_ms: Option<i64>,
    pub send_in_progress: bool,
    pub last_batch_seq: Option<u64>,
}

impl AlertState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(
        &mut self,
        batch_seq: u64,
        breach: bool,
        now_ms: i64,
        policy: &AlertPolicy,
    ) -> GateDecision {
        if matches!(self.last_batch_seq, Some(last) if batch_seq <= last) {
            return GateDecision::Duplicate;
        }
        self.last_batch_seq = Some(batch_seq);

        if !breach {
            self.consecutive_breaches = 0;
            return GateDecision::Healthy;
        }

        self.consecutive_breaches = self.consecutive_breaches.saturating_add(1);
        if self.consecutive_breaches < policy.threshold {
            return GateDecision::Degrading(self.consecutive_breaches);
        }

        if self.send_in_progress {
            return GateDecision::SendInFlight;
        }

        if let Some(last) = self.last_notified_at_ms {
            let elapsed = now_ms - last;
            if elapsed < policy.cooldown_ms() {
                return GateDecision::CoolingDown {
                    remaining_ms: policy.cooldown_ms() - elapsed,
                };
            }
        }

        self.send_in_progress = true;
        GateDecision::Fire {
            breaches: self.consecutive_breaches,
        }
    }

    pub fn confirm_sent(&mut self, now_ms: i64) {
        self.last_notified_at_ms = Some(now_ms);
        self.consecutive_breaches = 0;
        self.send_in_progress = false;
    }

    /// Delivery failed; the streak is kept so the next batch may retry
    pub fn send_failed(&mut self) {
        self.send_in_progress = false;
    }

    /// Drop the breach streak, keeping cooldown and in-flight bookkeeping
    pub fn reset(&mut self) {
        self.consecutive_breaches = 0;
    }

    pub fn is_alerting(&self, now_ms: i64, policy: &AlertPolicy) -> bool {
        self.last_notified_at_ms
            .map(|last| now_ms - last < policy.cooldown_ms())
            .unwrap_or(false)
    }
}
