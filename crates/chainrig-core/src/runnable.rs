//! Process-control capability shared by every network component.
//!
//! A component is either a single [`Runnable`] or a [`RunnableSet`] of
//! homogeneous members (e.g. N beacon nodes). The set aggregates its members
//! and is itself a `Runnable`, so the orchestrator treats both uniformly.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{RunnableError, RunnableResult};

/// Start/stop/health surface of one network component.
#[async_trait]
pub trait Runnable: Send + Sync {
    fn name(&self) -> &str;

    /// Begin starting the component. Returns once initialization has begun,
    /// not once the component is ready.
    async fn start(&self, cancel: &CancellationToken) -> RunnableResult<()>;

    /// Short-poll health probe: has the component finished starting?
    async fn is_started(&self, cancel: &CancellationToken) -> RunnableResult<bool>;

    async fn stop(&self) -> RunnableResult<()>;

    async fn pause(&self) -> RunnableResult<()> {
        Err(RunnableError::Unsupported {
            component: self.name().to_string(),
            operation: "pause",
        })
    }

    async fn resume(&self) -> RunnableResult<()> {
        Err(RunnableError::Unsupported {
            component: self.name().to_string(),
            operation: "resume",
        })
    }

    /// OS process id, if the component is backed by a live process.
    fn pid(&self) -> Option<u32>;
}

/// Indexed collection of homogeneous runnables.
pub struct RunnableSet {
    name: String,
    members: Vec<Arc<dyn Runnable>>,
    expected: usize,
}

impl RunnableSet {
    /// A set that counts as started once every member has started.
    pub fn new(name: impl Into<String>, members: Vec<Arc<dyn Runnable>>) -> Self {
        let expected = members.len();
        Self {
            name: name.into(),
            members,
            expected,
        }
    }

    /// Count the set as started once `expected` members have started.
    pub fn with_expected(mut self, expected: usize) -> Self {
        self.expected = expected.min(self.members.len());
        self
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Member at `index`; `NotFound` past the end.
    pub fn at(&self, index: usize) -> RunnableResult<Arc<dyn Runnable>> {
        self.members
            .get(index)
            .cloned()
            .ok_or_else(|| RunnableError::NotFound {
                set: self.name.clone(),
                index,
                size: self.members.len(),
            })
    }

    /// Number of members currently reporting started.
    pub async fn started_count(&self, cancel: &CancellationToken) -> RunnableResult<usize> {
        let mut started = 0;
        for member in &self.members {
            if member.is_started(cancel).await? {
                started += 1;
            }
        }
        Ok(started)
    }
}

#[async_trait]
impl Runnable for RunnableSet {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, cancel: &CancellationToken) -> RunnableResult<()> {
        try_join_all(self.members.iter().map(|m| m.start(cancel))).await?;
        debug!(set = %self.name, members = self.members.len(), "set started");
        Ok(())
    }

    async fn is_started(&self, cancel: &CancellationToken) -> RunnableResult<bool> {
        Ok(self.started_count(cancel).await? >= self.expected)
    }

    /// Stops every member; reports the first failure after trying all.
    async fn stop(&self) -> RunnableResult<()> {
        let mut first_err = None;
        for member in self.members.iter().rev() {
            if let Err(e) = member.stop().await {
                warn!(set = %self.name, member = member.name(), error = %e, "member stop failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    async fn pause(&self) -> RunnableResult<()> {
        try_join_all(self.members.iter().map(|m| m.pause())).await?;
        Ok(())
    }

    async fn resume(&self) -> RunnableResult<()> {
        try_join_all(self.members.iter().map(|m| m.resume())).await?;
        Ok(())
    }

    /// Sets have no single process; use [`ComponentHandle::pids`].
    fn pid(&self) -> Option<u32> {
        None
    }
}

/// Whether a component is one runnable or a set of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Single,
    Set,
}

/// Handle the orchestrator holds for each component.
#[derive(Clone)]
pub enum ComponentHandle {
    Single(Arc<dyn Runnable>),
    Set(Arc<RunnableSet>),
}

impl ComponentHandle {
    pub fn kind(&self) -> ComponentKind {
        match self {
            ComponentHandle::Single(_) => ComponentKind::Single,
            ComponentHandle::Set(_) => ComponentKind::Set,
        }
    }

    pub fn as_runnable(&self) -> Arc<dyn Runnable> {
        match self {
            ComponentHandle::Single(r) => Arc::clone(r),
            ComponentHandle::Set(s) => Arc::clone(s) as Arc<dyn Runnable>,
        }
    }

    /// Member at `index` of a set; a single component only has index 0.
    pub fn at(&self, index: usize) -> RunnableResult<Arc<dyn Runnable>> {
        match self {
            ComponentHandle::Set(s) => s.at(index),
            ComponentHandle::Single(r) if index == 0 => Ok(Arc::clone(r)),
            ComponentHandle::Single(r) => Err(RunnableError::NotFound {
                set: r.name().to_string(),
                index,
                size: 1,
            }),
        }
    }

    /// `(member name, pid)` for every member with a live process.
    /// Sets are walked with `at(i)` until `NotFound`.
    pub fn pids(&self) -> Vec<(String, u32)> {
        let mut out = Vec::new();
        let mut index = 0;
        while let Ok(member) = self.at(index) {
            if let Some(pid) = member.pid() {
                out.push((member.name().to_string(), pid));
            }
            index += 1;
        }
        out
    }
}

impl From<Arc<dyn Runnable>> for ComponentHandle {
    fn from(r: Arc<dyn Runnable>) -> Self {
        ComponentHandle::Single(r)
    }
}

impl From<RunnableSet> for ComponentHandle {
    fn from(s: RunnableSet) -> Self {
        ComponentHandle::Set(Arc::new(s))
    }
}
