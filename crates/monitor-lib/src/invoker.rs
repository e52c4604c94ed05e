//! Retry wrapper for calls that cross into collaborators
//!
//! Every probe, notification and status-sink call goes through an
//! [`Invoker`]. Failed attempts wait `base_delay * attempt` before the next
//! one; after the last attempt the error is returned tagged with its call
//! site and the caller treats the cycle as failed.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::observability::MonitorMetrics;

/// Where an invoked call originates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallSite {
    Probe,
    Notification,
    StatusSink,
}

impl CallSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallSite::Probe => "probe",
            CallSite::Notification => "notification",
            CallSite::StatusSink => "status_sink",
        }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before the attempt following `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// All attempts of an invoked call failed
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{call_site} failed after {attempts} attempt(s): {message}")]
pub struct InvokeError {
    pub call_site: CallSite,
    pub attempts: u32,
    pub message: String,
}

/// Runs fallible async calls under a [`RetryPolicy`]
#[derive(Clone)]
pub struct Invoker {
    policy: RetryPolicy,
    metrics: MonitorMetrics,
}

impl Default for Invoker {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl Invoker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            metrics: MonitorMetrics::new(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn invoke<T, F, Fut>(&self, call_site: CallSite, mut op: F) -> Result<T, InvokeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts => {
                    let delay = self.policy.delay_after(attempt);
                    debug!(
                        call_site = %call_site,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    self.metrics.inc_invoke_retries(call_site.as_str());
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        call_site = %call_site,
                        attempts = attempt,
                        error = %e,
                        "All attempts failed"
                    );
                    return Err(InvokeError {
                        call_site,
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_invoke_succeeds_first_try() {
        let invoker = Invoker::default();
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result = invoker
            .invoke(CallSite::Probe, || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_linear_backoff() {
        let invoker = Invoker::default();
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let start = Instant::now();

        let result = invoker
            .invoke(CallSite::Notification, || {
                let c = c.clone();
                async move {
                    let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        anyhow::bail!("transient failure {}", n)
                    }
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        // 1s after the first failure, 2s after the second
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_exhausts_attempts() {
        let invoker = Invoker::default();
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let start = Instant::now();

        let result: Result<(), _> = invoker
            .invoke(CallSite::StatusSink, || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    anyhow::bail!("sink down")
                }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.call_site, CallSite::StatusSink);
        assert_eq!(err.attempts, 3);
        assert!(err.message.contains("sink down"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // No wait after the final attempt
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[test]
    fn test_delay_after() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
    }
}
