//! Error types for orchestration and evaluation.

use std::time::Duration;

use chainrig_api::{ApiError, Epoch, Slot};
use thiserror::Error;

/// Errors produced by a [`crate::runnable::Runnable`].
#[derive(Debug, Error)]
pub enum RunnableError {
    /// Set member lookup past the end of the set.
    #[error("{set}[{index}] not found (set has {size} members)")]
    NotFound {
        set: String,
        index: usize,
        size: usize,
    },

    #[error("{component} failed to start: {reason}")]
    StartFailed { component: String, reason: String },

    /// Health probe could not be evaluated.
    #[error("readiness probe for {component} failed: {reason}")]
    Probe { component: String, reason: String },

    /// The underlying process exited on its own.
    #[error("{component} exited unexpectedly ({status})")]
    Exited { component: String, status: String },

    #[error("{component} does not support {operation}")]
    Unsupported {
        component: String,
        operation: &'static str,
    },

    #[error("{component} is misconfigured: {reason}")]
    Misconfigured { component: String, reason: String },

    #[error("{component}: cancelled")]
    Cancelled { component: String },

    #[error("{component}: i/o error: {source}")]
    Io {
        component: String,
        #[source]
        source: std::io::Error,
    },
}

impl RunnableError {
    /// Errors no amount of waiting will clear. Anything else from a
    /// readiness probe means "not started yet".
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RunnableError::Exited { .. }
                | RunnableError::StartFailed { .. }
                | RunnableError::Misconfigured { .. }
        )
    }
}

pub type RunnableResult<T> = std::result::Result<T, RunnableError>;

/// Errors produced while waiting for runnables to report started.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("dependencies not ready after {waited:?}: {}", .pending.join(", "))]
    DependencyTimeout {
        pending: Vec<String>,
        waited: Duration,
    },

    #[error("cancelled while waiting for: {}", .pending.join(", "))]
    Cancelled { pending: Vec<String> },

    /// A dependency reported an error that waiting cannot clear.
    #[error("dependency {component} failed: {reason}")]
    DependencyFailed { component: String, reason: String },
}

impl GateError {
    /// Components the gate was still waiting on, or the one that failed.
    pub fn components(&self) -> Vec<String> {
        match self {
            GateError::DependencyTimeout { pending, .. } | GateError::Cancelled { pending } => {
                pending.clone()
            }
            GateError::DependencyFailed { component, .. } => vec![component.clone()],
        }
    }
}

pub type GateResult<T> = std::result::Result<T, GateError>;

/// Errors produced by the component dependency graph.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("dependency cycle detected involving components: {components:?}")]
    Cycle { components: Vec<String> },

    #[error("component not found in graph: {name}")]
    UnknownComponent { name: String },

    #[error("component registered twice: {name}")]
    DuplicateComponent { name: String },
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Errors produced by the orchestrator. The first one observed ends the run.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("{component} requires {} to run: {source}", .dependencies.join(", "))]
    DependencyNotReady {
        component: String,
        dependencies: Vec<String>,
        #[source]
        source: GateError,
    },

    #[error("{component} failed to start: {source}")]
    StartFailed {
        component: String,
        #[source]
        source: RunnableError,
    },

    #[error("{component}: startup cancelled")]
    Cancelled { component: String },

    /// The component could not be constructed.
    #[error("failed to set up {component}: {source}")]
    Setup {
        component: String,
        #[source]
        source: RunnableError,
    },

    /// Every component was launched, but not all of them reported started.
    #[error("network not ready: {source}")]
    NotReady {
        pending: Vec<String>,
        #[source]
        source: GateError,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("startup task panicked: {reason}")]
    TaskPanicked { reason: String },
}

impl OrchestratorError {
    /// Component the error is attributed to, when there is one.
    pub fn component(&self) -> Option<&str> {
        match self {
            OrchestratorError::DependencyNotReady { component, .. }
            | OrchestratorError::StartFailed { component, .. }
            | OrchestratorError::Cancelled { component }
            | OrchestratorError::Setup { component, .. } => Some(component),
            OrchestratorError::NotReady { pending, .. } => pending.first().map(String::as_str),
            OrchestratorError::Graph(_) | OrchestratorError::TaskPanicked { .. } => None,
        }
    }
}

pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;

/// Errors produced by a single evaluation.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("network api error: {0}")]
    Api(#[from] ApiError),

    /// A checked property does not hold.
    #[error("property violated: {0}")]
    Violation(String),

    /// A fault injection was accepted by the network.
    #[error("expected {what} to fail processing (accepted by {endpoint})")]
    ExpectedRejection { what: String, endpoint: String },

    /// The network was not in a state the evaluation can work with.
    #[error("precondition not met: {0}")]
    Precondition(String),

    #[error("evaluation cancelled")]
    Cancelled,
}

pub type EvalResult<T> = std::result::Result<T, EvalError>;

/// Why an evaluation run stopped before completing its epoch budget.
#[derive(Debug, Error)]
pub enum EvaluationFailure {
    #[error("evaluator {evaluator} failed at epoch {epoch}: {source}")]
    Evaluation {
        evaluator: String,
        epoch: Epoch,
        #[source]
        source: EvalError,
    },

    #[error("chain did not reach epoch {epoch} within {waited:?} (last head slot {last_slot:?})")]
    EpochTimeout {
        epoch: Epoch,
        waited: Duration,
        last_slot: Option<Slot>,
    },

    #[error("evaluation cancelled before epoch {epoch}")]
    Cancelled { epoch: Epoch },
}

impl EvaluationFailure {
    /// Name of the failing evaluator, when an evaluation failed.
    pub fn evaluator(&self) -> Option<&str> {
        match self {
            EvaluationFailure::Evaluation { evaluator, .. } => Some(evaluator),
            _ => None,
        }
    }

    pub fn epoch(&self) -> Epoch {
        match self {
            EvaluationFailure::Evaluation { epoch, .. }
            | EvaluationFailure::EpochTimeout { epoch, .. }
            | EvaluationFailure::Cancelled { epoch } => *epoch,
        }
    }
}

/// Failure of a full end-to-end run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("orchestration failed: {0}")]
    Orchestration(#[from] OrchestratorError),

    #[error("evaluation failed: {0}")]
    Evaluation(#[from] EvaluationFailure),
}

/// Errors produced while loading or validating run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("unknown evaluator: {name}")]
    UnknownEvaluator { name: String },

    #[error("evaluator {name} needs an epoch suffix (e.g. {name}@5)")]
    MissingEpoch { name: String },

    #[error("evaluator {name} has invalid epoch suffix {value:?}")]
    InvalidEpoch { name: String, value: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
