//! Readiness gate: wait until a group of runnables reports started.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{GateError, GateResult};
use crate::runnable::Runnable;

/// Bounds for a readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateConfig {
    /// Give up after this long. Zero means a single check.
    pub timeout: Duration,
    /// Delay between probe rounds.
    pub poll_interval: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReadinessGate {
    config: GateConfig,
}

impl ReadinessGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Poll every runnable's `is_started` until all report true.
    ///
    /// A transient probe error counts as "not started yet"; a fatal one
    /// (see [`crate::error::RunnableError::is_fatal`]) returns
    /// [`GateError::DependencyFailed`] at once. Returns
    /// [`GateError::DependencyTimeout`] once the deadline has passed and
    /// [`GateError::Cancelled`] as soon as `cancel` fires.
    pub async fn wait_all(
        &self,
        runnables: &[Arc<dyn Runnable>],
        cancel: &CancellationToken,
    ) -> GateResult<()> {
        let began = Instant::now();
        let deadline = began + self.config.timeout;

        loop {
            if cancel.is_cancelled() {
                return Err(GateError::Cancelled {
                    pending: names(runnables),
                });
            }

            let mut pending = Vec::new();
            for runnable in runnables {
                match runnable.is_started(cancel).await {
                    Ok(true) => {}
                    Ok(false) => pending.push(runnable.name().to_string()),
                    Err(e) if e.is_fatal() => {
                        warn!(component = runnable.name(), error = %e, "dependency failed");
                        return Err(GateError::DependencyFailed {
                            component: runnable.name().to_string(),
                            reason: e.to_string(),
                        });
                    }
                    Err(e) => {
                        trace!(component = runnable.name(), error = %e, "probe error, still waiting");
                        pending.push(runnable.name().to_string());
                    }
                }
            }
            if pending.is_empty() {
                debug!(count = runnables.len(), waited = ?began.elapsed(), "all dependencies started");
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(GateError::DependencyTimeout {
                    pending,
                    waited: now - began,
                });
            }

            let nap = self.config.poll_interval.min(deadline - now);
            tokio::select! {
                _ = cancel.cancelled() => return Err(GateError::Cancelled { pending }),
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }
}

fn names(runnables: &[Arc<dyn Runnable>]) -> Vec<String> {
    runnables.iter().map(|r| r.name().to_string()).collect()
}
