//! In-process stand-ins for network components.
//!
//! `SimulatedComponent` behaves like a process that takes a while to come
//! up: `start` returns immediately and `is_started` turns true once the
//! startup delay has elapsed (on the `tokio::time` clock). Used by
//! `chainrig simulate` and throughout the tests.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{RunnableError, RunnableResult};
use crate::runnable::Runnable;
use crate::topology::{ComponentFactory, ComponentRole};

static NEXT_PID: AtomicU32 = AtomicU32::new(40_000);

#[derive(Debug, Default)]
struct Lifecycle {
    started_at: Option<Instant>,
    pid: Option<u32>,
    paused: bool,
    stopped: bool,
}

#[derive(Debug)]
pub struct SimulatedComponent {
    name: String,
    startup_delay: Duration,
    start_failure: Option<String>,
    start_count: AtomicUsize,
    lifecycle: Mutex<Lifecycle>,
}

impl SimulatedComponent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            startup_delay: Duration::ZERO,
            start_failure: None,
            start_count: AtomicUsize::new(0),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    /// Make every `start` call fail with `reason`.
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.start_failure = Some(reason.into());
        self
    }

    /// How many times `start` has been called.
    pub fn start_count(&self) -> usize {
        self.start_count.load(Ordering::SeqCst)
    }

    /// When `start` was last called.
    pub fn started_at(&self) -> Option<Instant> {
        self.lock().started_at
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Runnable for SimulatedComponent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, _cancel: &CancellationToken) -> RunnableResult<()> {
        self.start_count.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.start_failure {
            return Err(RunnableError::StartFailed {
                component: self.name.clone(),
                reason: reason.clone(),
            });
        }
        let mut lc = self.lock();
        lc.started_at = Some(Instant::now());
        lc.pid = Some(NEXT_PID.fetch_add(1, Ordering::SeqCst));
        lc.stopped = false;
        debug!(component = %self.name, pid = ?lc.pid, "simulated component starting");
        Ok(())
    }

    async fn is_started(&self, _cancel: &CancellationToken) -> RunnableResult<bool> {
        let lc = self.lock();
        Ok(!lc.stopped
            && lc
                .started_at
                .is_some_and(|t| t.elapsed() >= self.startup_delay))
    }

    async fn stop(&self) -> RunnableResult<()> {
        let mut lc = self.lock();
        lc.stopped = true;
        lc.pid = None;
        Ok(())
    }

    async fn pause(&self) -> RunnableResult<()> {
        self.lock().paused = true;
        Ok(())
    }

    async fn resume(&self) -> RunnableResult<()> {
        self.lock().paused = false;
        Ok(())
    }

    fn pid(&self) -> Option<u32> {
        self.lock().pid
    }
}

/// Builds [`SimulatedComponent`]s for every role, with a per-role startup delay.
#[derive(Debug, Clone)]
pub struct SimComponentFactory {
    startup_delay: Duration,
    failing_role: Option<ComponentRole>,
}

impl SimComponentFactory {
    pub fn new(startup_delay: Duration) -> Self {
        Self {
            startup_delay,
            failing_role: None,
        }
    }

    /// Make every component of `role` fail on start.
    pub fn with_failing_role(mut self, role: ComponentRole) -> Self {
        self.failing_role = Some(role);
        self
    }

    fn build(&self, role: ComponentRole, name: String) -> Arc<dyn Runnable> {
        let mut component = SimulatedComponent::new(name).with_startup_delay(self.startup_delay);
        if self.failing_role == Some(role) {
            component = component.failing("simulated start failure");
        }
        Arc::new(component)
    }
}

impl ComponentFactory for SimComponentFactory {
    fn single(&self, role: ComponentRole) -> RunnableResult<Arc<dyn Runnable>> {
        Ok(self.build(role, role.name().to_string()))
    }

    fn member(&self, role: ComponentRole, index: usize) -> RunnableResult<Arc<dyn Runnable>> {
        Ok(self.build(role, format!("{}-{index}", role.name())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_started_after_delay() {
        let cancel = CancellationToken::new();
        let c = SimulatedComponent::new("beacon-node-0").with_startup_delay(Duration::from_secs(2));
        assert!(!c.is_started(&cancel).await.unwrap());
        c.start(&cancel).await.unwrap();
        assert!(!c.is_started(&cancel).await.unwrap());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(c.is_started(&cancel).await.unwrap());
        assert!(c.pid().is_some());
    }

    #[tokio::test]
    async fn test_failing_component_counts_attempts() {
        let cancel = CancellationToken::new();
        let c = SimulatedComponent::new("bootnode").failing("port in use");
        let err = c.start(&cancel).await.unwrap_err();
        assert!(err.to_string().contains("port in use"));
        assert_eq!(c.start_count(), 1);
        assert!(c.pid().is_none());
    }

    #[tokio::test]
    async fn test_stop_clears_pid_and_pause_round_trip() {
        let cancel = CancellationToken::new();
        let c = SimulatedComponent::new("validator-client-0");
        c.start(&cancel).await.unwrap();
        c.pause().await.unwrap();
        assert!(c.is_paused());
        c.resume().await.unwrap();
        assert!(!c.is_paused());
        c.stop().await.unwrap();
        assert!(c.pid().is_none());
        assert!(!c.is_started(&cancel).await.unwrap());
    }
}
