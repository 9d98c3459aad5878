//! Dependency-ordered concurrent component startup.
//!
//! One task per component runs on a `JoinSet`. Each task waits on its
//! dependencies through the [`ReadinessGate`], then calls `start`. All tasks
//! share one `CancellationToken`: the first error cancels it, every other
//! in-flight task observes the cancellation, and `run` reports that first
//! error.
//!
//! # Example
//!
//! ```ignore
//! let mut orch = Orchestrator::new(OrchestratorConfig::default());
//! orch.add_component("bootnode", bootnode.into(), &[])?;
//! orch.add_component("beacon-node", beacons.into(), &["bootnode"])?;
//! orch.run().await?;
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{GateError, GraphResult, OrchestratorError, OrchestratorResult, RunnableError};
use crate::graph::ComponentGraph;
use crate::obs;
use crate::readiness::{GateConfig, ReadinessGate};
use crate::runnable::{ComponentHandle, ComponentKind, Runnable};

/// Lifecycle of one component within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    Pending,
    WaitingOnDeps,
    Starting,
    Started,
    Failed,
    Stopped,
}

/// Lifecycle of the whole startup run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Cancelling,
    Done,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OrchestratorConfig {
    pub gate: GateConfig,
}

/// One PID listing row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessEntry {
    pub component: String,
    pub member: String,
    pub pid: u32,
}

#[derive(Debug, Default)]
struct Shared {
    states: BTreeMap<String, ComponentState>,
    run_state: Option<RunState>,
    started: Vec<String>,
}

/// Owns the component graph and the run's cancellation token.
pub struct Orchestrator {
    config: OrchestratorConfig,
    graph: ComponentGraph,
    components: BTreeMap<String, ComponentHandle>,
    cancel: CancellationToken,
    shared: Arc<Mutex<Shared>>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self::with_cancel(config, CancellationToken::new())
    }

    /// Use an externally owned token (e.g. one cancelled on Ctrl-C).
    pub fn with_cancel(config: OrchestratorConfig, cancel: CancellationToken) -> Self {
        Self {
            config,
            graph: ComponentGraph::new(),
            components: BTreeMap::new(),
            cancel,
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    /// Register a component that must not start before `dependencies`.
    /// Dependencies must already be registered.
    pub fn add_component(
        &mut self,
        name: &str,
        handle: ComponentHandle,
        dependencies: &[&str],
    ) -> GraphResult<()> {
        self.graph.add_node(name)?;
        for dep in dependencies {
            if let Err(e) = self.graph.add_dependency(dep, name) {
                self.graph.remove_node(name);
                return Err(e);
            }
        }
        self.components.insert(name.to_string(), handle);
        self.lock()
            .states
            .insert(name.to_string(), ComponentState::Pending);
        Ok(())
    }

    /// Add an edge between two registered components.
    pub fn add_dependency(&mut self, dependency: &str, dependent: &str) -> GraphResult<()> {
        self.graph.add_dependency(dependency, dependent)
    }

    pub fn graph(&self) -> &ComponentGraph {
        &self.graph
    }

    pub fn start_order(&self) -> GraphResult<Vec<String>> {
        self.graph.topological_order()
    }

    pub fn component(&self, name: &str) -> Option<&ComponentHandle> {
        self.components.get(name)
    }

    pub fn kind_of(&self, name: &str) -> Option<ComponentKind> {
        self.components.get(name).map(ComponentHandle::kind)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self, name: &str) -> Option<ComponentState> {
        self.lock().states.get(name).copied()
    }

    pub fn run_state(&self) -> RunState {
        self.lock().run_state.unwrap_or(RunState::Idle)
    }

    /// Components whose `start` returned, in the order they did.
    pub fn started_components(&self) -> Vec<String> {
        self.lock().started.clone()
    }

    /// Start every component, dependencies first.
    ///
    /// Returns the first error observed. On error the shared token is
    /// cancelled before returning.
    #[instrument(skip(self), fields(components = self.components.len()))]
    pub async fn run(&self) -> OrchestratorResult<()> {
        let order = self.graph.topological_order()?;
        self.set_run_state(RunState::Running);
        info!(order = ?order, "starting components");

        let mut tasks = JoinSet::new();
        for name in order {
            let dependency_names = self.graph.dependencies_of(&name)?;
            let dependencies = dependency_names
                .iter()
                .filter_map(|d| self.components.get(d).map(ComponentHandle::as_runnable))
                .collect();
            let Some(handle) = self.components.get(&name).cloned() else {
                continue;
            };
            let task = ComponentTask {
                name,
                handle,
                dependency_names,
                dependencies,
                gate: ReadinessGate::new(self.config.gate),
                cancel: self.cancel.clone(),
                shared: Arc::clone(&self.shared),
            };
            tasks.spawn(task.run());
        }

        let mut first_err: Option<OrchestratorError> = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.unwrap_or_else(|e| {
                Err(OrchestratorError::TaskPanicked {
                    reason: e.to_string(),
                })
            });
            let Err(err) = outcome else { continue };
            if first_err.is_none() {
                if let Some(component) = err.component() {
                    obs::emit_component_failed(component, &err);
                }
                self.set_run_state(RunState::Cancelling);
                self.cancel.cancel();
                first_err = Some(err);
            } else {
                debug!(error = %err, "follow-on startup error");
            }
        }

        self.set_run_state(RunState::Done);
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Wait until every component, leaves included, reports started.
    ///
    /// `run` only guarantees that each component's dependencies are ready;
    /// components nothing depends on may still be initializing when it
    /// returns. Uses the same gate bounds as startup.
    #[instrument(skip(self))]
    pub async fn await_all_started(&self) -> OrchestratorResult<()> {
        let order = self.graph.topological_order()?;
        let runnables: Vec<Arc<dyn Runnable>> = order
            .iter()
            .filter_map(|name| self.components.get(name).map(ComponentHandle::as_runnable))
            .collect();
        ReadinessGate::new(self.config.gate)
            .wait_all(&runnables, &self.cancel)
            .await
            .map_err(|source| OrchestratorError::NotReady {
                pending: source.components(),
                source,
            })?;
        info!(components = runnables.len(), "all components report started");
        Ok(())
    }

    /// PIDs of every component in start order. Never fails: components
    /// without a live process are skipped.
    pub fn process_ids(&self) -> Vec<ProcessEntry> {
        let order = self
            .graph
            .topological_order()
            .unwrap_or_else(|_| self.components.keys().cloned().collect());
        order
            .iter()
            .filter_map(|name| self.components.get(name).map(|h| (name, h)))
            .flat_map(|(name, handle)| {
                handle.pids().into_iter().map(move |(member, pid)| ProcessEntry {
                    component: name.clone(),
                    member,
                    pid,
                })
            })
            .collect()
    }

    /// Stop every component, best-effort: started ones in reverse start
    /// order, then any that failed or were mid-start. Failures are logged and
    /// returned, never raised.
    pub async fn stop_all(&self) -> Vec<(String, RunnableError)> {
        let (mut order, others) = {
            let shared = self.lock();
            let started = shared.started.clone();
            let others: Vec<String> = shared
                .states
                .iter()
                .filter(|(_, s)| matches!(s, ComponentState::Starting | ComponentState::Failed))
                .map(|(n, _)| n.clone())
                .filter(|n| !started.contains(n))
                .collect();
            (started, others)
        };
        order.reverse();
        order.extend(others);

        let mut failures = Vec::new();
        for name in order {
            let Some(handle) = self.components.get(&name) else {
                continue;
            };
            match handle.as_runnable().stop().await {
                Ok(()) => {
                    self.set_state(&name, ComponentState::Stopped);
                    obs::emit_component_stopped(&name);
                }
                Err(e) => {
                    warn!(component = %name, error = %e, "stop failed");
                    failures.push((name, e));
                }
            }
        }
        failures
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        lock_shared(&self.shared)
    }

    fn set_run_state(&self, state: RunState) {
        self.lock().run_state = Some(state);
    }

    fn set_state(&self, name: &str, state: ComponentState) {
        self.lock().states.insert(name.to_string(), state);
    }
}

fn lock_shared(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

/// Startup task for one component.
struct ComponentTask {
    name: String,
    handle: ComponentHandle,
    dependency_names: Vec<String>,
    dependencies: Vec<Arc<dyn Runnable>>,
    gate: ReadinessGate,
    cancel: CancellationToken,
    shared: Arc<Mutex<Shared>>,
}

impl ComponentTask {
    async fn run(self) -> OrchestratorResult<()> {
        let result = self.start().await;
        let state = if result.is_ok() {
            ComponentState::Started
        } else {
            ComponentState::Failed
        };
        let mut shared = lock_shared(&self.shared);
        shared.states.insert(self.name.clone(), state);
        if result.is_ok() {
            shared.started.push(self.name.clone());
        }
        result
    }

    async fn start(&self) -> OrchestratorResult<()> {
        self.set_state(ComponentState::WaitingOnDeps);
        if !self.dependencies.is_empty() {
            debug!(component = %self.name, deps = ?self.dependency_names, "waiting on dependencies");
            self.gate
                .wait_all(&self.dependencies, &self.cancel)
                .await
                .map_err(|source| match source {
                    GateError::Cancelled { .. } => OrchestratorError::Cancelled {
                        component: self.name.clone(),
                    },
                    source => OrchestratorError::DependencyNotReady {
                        component: self.name.clone(),
                        dependencies: self.dependency_names.clone(),
                        source,
                    },
                })?;
        }

        if self.cancel.is_cancelled() {
            return Err(OrchestratorError::Cancelled {
                component: self.name.clone(),
            });
        }

        self.set_state(ComponentState::Starting);
        let runnable = self.handle.as_runnable();
        tokio::select! {
            _ = self.cancel.cancelled() => {
                return Err(OrchestratorError::Cancelled {
                    component: self.name.clone(),
                });
            }
            result = runnable.start(&self.cancel) => {
                result.map_err(|source| OrchestratorError::StartFailed {
                    component: self.name.clone(),
                    source,
                })?;
            }
        }

        obs::emit_component_started(&self.name, &self.handle.pids());
        Ok(())
    }

    fn set_state(&self, state: ComponentState) {
        lock_shared(&self.shared)
            .states
            .insert(self.name.clone(), state);
    }
}
