//! Canonical network topology.
//!
//! Resolves the optional slots (builder/proxy, remote signer, trace sink) in
//! one place and wires the orchestrator graph:
//!
//! ```text
//! tracing-sink ─┐
//! bootnode ─────┤
//! execution-node ┬─ [proxy | builder] ─┤
//!                └─────────────────────┴─ beacon-node ─┬─ validator-client
//!                                         web3signer ──┘
//! ```
//!
//! Construction of each component is delegated to a [`ComponentFactory`], so
//! the same topology drives real processes and simulated components.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{OrchestratorError, OrchestratorResult, RunnableResult};
use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::runnable::{ComponentHandle, ComponentKind, Runnable, RunnableSet};

/// Every kind of component the harness knows how to place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentRole {
    TracingSink,
    Bootnode,
    ExecutionNode,
    Proxy,
    Builder,
    BeaconNode,
    Web3Signer,
    ValidatorClient,
}

impl ComponentRole {
    pub const ALL: [ComponentRole; 8] = [
        ComponentRole::TracingSink,
        ComponentRole::Bootnode,
        ComponentRole::ExecutionNode,
        ComponentRole::Proxy,
        ComponentRole::Builder,
        ComponentRole::BeaconNode,
        ComponentRole::Web3Signer,
        ComponentRole::ValidatorClient,
    ];

    /// Component name used in the graph, logs and log file names.
    pub fn name(&self) -> &'static str {
        match self {
            ComponentRole::TracingSink => "tracing-sink",
            ComponentRole::Bootnode => "bootnode",
            ComponentRole::ExecutionNode => "execution-node",
            ComponentRole::Proxy => "proxy",
            ComponentRole::Builder => "builder",
            ComponentRole::BeaconNode => "beacon-node",
            ComponentRole::Web3Signer => "web3signer",
            ComponentRole::ValidatorClient => "validator-client",
        }
    }

    /// Whether the role runs one instance per beacon node.
    pub fn kind(&self) -> ComponentKind {
        match self {
            ComponentRole::TracingSink | ComponentRole::Bootnode | ComponentRole::Web3Signer => {
                ComponentKind::Single
            }
            _ => ComponentKind::Set,
        }
    }
}

impl fmt::Display for ComponentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ComponentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ComponentRole::ALL
            .into_iter()
            .find(|r| r.name() == s)
            .ok_or_else(|| format!("unknown component role: {s}"))
    }
}

/// What sits between the execution and beacon nodes. Mutually exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuilderSlot {
    #[default]
    None,
    Builder,
    Proxy,
}

impl BuilderSlot {
    pub fn role(&self) -> Option<ComponentRole> {
        match self {
            BuilderSlot::None => None,
            BuilderSlot::Builder => Some(ComponentRole::Builder),
            BuilderSlot::Proxy => Some(ComponentRole::Proxy),
        }
    }
}

/// Shape of the network to bring up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Number of execution/beacon/validator triples.
    pub beacon_nodes: usize,
    pub builder: BuilderSlot,
    pub remote_signer: bool,
    pub tracing_sink: bool,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            beacon_nodes: 2,
            builder: BuilderSlot::None,
            remote_signer: false,
            tracing_sink: true,
        }
    }
}

impl TopologyConfig {
    /// Roles present in this topology, dependencies first.
    pub fn roles(&self) -> Vec<ComponentRole> {
        let mut roles = Vec::new();
        if self.tracing_sink {
            roles.push(ComponentRole::TracingSink);
        }
        roles.push(ComponentRole::Bootnode);
        roles.push(ComponentRole::ExecutionNode);
        roles.extend(self.builder.role());
        roles.push(ComponentRole::BeaconNode);
        if self.remote_signer {
            roles.push(ComponentRole::Web3Signer);
        }
        roles.push(ComponentRole::ValidatorClient);
        roles
    }

    /// Roles `role` must wait for in this topology.
    pub fn dependencies(&self, role: ComponentRole) -> Vec<ComponentRole> {
        let present = self.roles();
        let wanted: Vec<ComponentRole> = match role {
            ComponentRole::TracingSink | ComponentRole::Bootnode => vec![],
            ComponentRole::ExecutionNode => vec![],
            ComponentRole::Proxy | ComponentRole::Builder => vec![ComponentRole::ExecutionNode],
            ComponentRole::BeaconNode => {
                let mut deps = vec![
                    ComponentRole::TracingSink,
                    ComponentRole::Bootnode,
                    ComponentRole::ExecutionNode,
                ];
                deps.extend(self.builder.role());
                deps
            }
            ComponentRole::Web3Signer => vec![],
            ComponentRole::ValidatorClient => {
                vec![ComponentRole::BeaconNode, ComponentRole::Web3Signer]
            }
        };
        wanted.into_iter().filter(|r| present.contains(r)).collect()
    }
}

/// Builds the runnable for each placed component.
pub trait ComponentFactory: Send + Sync {
    /// The one instance of a single-kind role.
    fn single(&self, role: ComponentRole) -> RunnableResult<Arc<dyn Runnable>>;

    /// Member `index` of a set-kind role.
    fn member(&self, role: ComponentRole, index: usize) -> RunnableResult<Arc<dyn Runnable>>;
}

/// Build an orchestrator for `topology`, constructing components through
/// `factory`.
pub fn build_orchestrator(
    topology: &TopologyConfig,
    factory: &dyn ComponentFactory,
    config: OrchestratorConfig,
    cancel: CancellationToken,
) -> OrchestratorResult<Orchestrator> {
    let mut orch = Orchestrator::with_cancel(config, cancel);

    for role in topology.roles() {
        let setup_err = |source| OrchestratorError::Setup {
            component: role.name().to_string(),
            source,
        };
        let handle = match role.kind() {
            ComponentKind::Single => ComponentHandle::Single(factory.single(role).map_err(setup_err)?),
            ComponentKind::Set => {
                let members = (0..topology.beacon_nodes)
                    .map(|i| factory.member(role, i))
                    .collect::<RunnableResult<Vec<_>>>()
                    .map_err(setup_err)?;
                ComponentHandle::from(RunnableSet::new(role.name(), members))
            }
        };
        let deps: Vec<&str> = topology
            .dependencies(role)
            .iter()
            .map(|r| r.name())
            .collect();
        orch.add_component(role.name(), handle, &deps)?;
    }
    Ok(orch)
}
