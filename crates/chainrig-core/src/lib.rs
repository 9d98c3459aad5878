//! chainrig core: brings up a multi-process beacon network in dependency
//! order, then walks it epoch by epoch running policy-gated evaluators,
//! including deliberate slashable fault injection.

pub mod config;
pub mod error;
pub mod evaluation;
pub mod evaluators;
pub mod graph;
pub mod obs;
pub mod orchestrator;
pub mod readiness;
pub mod reporting;
pub mod runnable;
pub mod runner;
pub mod sim;
pub mod telemetry;
pub mod topology;

pub use config::RunConfig;

pub use error::{
    ConfigError, ConfigResult, EvalError, EvalResult, EvaluationFailure, GateError, GateResult,
    GraphError, GraphResult, OrchestratorError, OrchestratorResult, RunError, RunnableError,
    RunnableResult,
};

pub use evaluation::{
    after_epoch, all_epochs, between_epochs, on_epoch, Evaluation, EvaluationContext,
    EvaluationRecord, EvaluationScheduler, Evaluator, InjectedFaultLedger, NetworkHandles, Policy,
    RetryPolicy, RunOutcome, SchedulerConfig,
};

pub use graph::ComponentGraph;
pub use orchestrator::{ComponentState, Orchestrator, OrchestratorConfig, ProcessEntry, RunState};
pub use readiness::{GateConfig, ReadinessGate};
pub use reporting::{RunReport, REPORT_SCHEMA_VERSION};
pub use runnable::{ComponentHandle, ComponentKind, Runnable, RunnableSet};
pub use runner::{run_end_to_end, RunArtifacts};
pub use sim::{SimComponentFactory, SimulatedComponent};
pub use topology::{build_orchestrator, BuilderSlot, ComponentFactory, ComponentRole, TopologyConfig};
