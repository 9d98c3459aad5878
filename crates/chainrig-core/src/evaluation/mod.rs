//! Epoch-driven evaluation engine.
//!
//! - [`policy`]: predicates deciding when an evaluator is due
//! - [`evaluator`]: the `Evaluation` trait and named evaluators
//! - [`context`]: run-scoped state, including the injected fault ledger
//! - [`retry`]: bounded retry for read-only network calls
//! - [`scheduler`]: walks epochs and dispatches due evaluators

pub mod context;
pub mod evaluator;
pub mod policy;
pub mod retry;
pub mod scheduler;

pub use context::{EvaluationContext, InjectedFaultLedger};
pub use evaluator::{Evaluation, Evaluator, NetworkHandles};
pub use policy::{after_epoch, all_epochs, between_epochs, on_epoch, Policy};
pub use retry::{retry_read, RetryPolicy};
pub use scheduler::{EvaluationRecord, EvaluationScheduler, RunOutcome, SchedulerConfig};
