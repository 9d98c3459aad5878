//! Structured observability hooks for run lifecycle events.
//!
//! This module provides:
//! - A run-scoped tracing span via [`run_span`]
//! - Emission functions for component startup, epoch progress, evaluations
//!   and injected faults
//!
//! Events are emitted at `info!` level (configurable via `CHAINRIG_LOG` or
//! `RUST_LOG`). For JSON output pass `--json` to the binary.

use tracing::{info, warn};

/// Run-scoped span. Attach it to the run future with
/// [`tracing::Instrument::instrument`] so every event carries the run id.
///
/// # Example
///
/// ```ignore
/// run(config).instrument(obs::run_span("3f1c...")).await;
/// ```
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("chainrig.run", run_id = %run_id)
}

/// Emit event: run started.
pub fn emit_run_started(run_id: &str, seed: u64, epochs: u64) {
    info!(event = "run.started", run_id = %run_id, seed, epochs);
}

/// Emit event: run finished.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, evaluations: usize, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms,
        evaluations,
        success,
    );
}

/// Emit event: component `start` returned.
pub fn emit_component_started(component: &str, pids: &[(String, u32)]) {
    let pids: Vec<u32> = pids.iter().map(|(_, pid)| *pid).collect();
    info!(event = "component.started", component = %component, pids = ?pids);
}

/// Emit event: component failed to come up (warning level).
pub fn emit_component_failed(component: &str, error: &dyn std::fmt::Display) {
    warn!(event = "component.failed", component = %component, error = %error);
}

pub fn emit_component_stopped(component: &str) {
    info!(event = "component.stopped", component = %component);
}

/// Emit event: the chain head reached `epoch`.
pub fn emit_epoch_reached(epoch: u64, head_slot: u64) {
    info!(event = "epoch.reached", epoch, head_slot);
}

pub fn emit_evaluation_passed(evaluator: &str, epoch: u64, duration_ms: u64) {
    info!(
        event = "evaluation.passed",
        evaluator = %evaluator,
        epoch,
        duration_ms,
    );
}

pub fn emit_evaluation_failed(evaluator: &str, epoch: u64, error: &dyn std::fmt::Display) {
    warn!(
        event = "evaluation.failed",
        evaluator = %evaluator,
        epoch,
        error = %error,
    );
}

/// Emit event: a deliberate fault was submitted to the network.
pub fn emit_fault_injected(kind: &str, validator_index: u64, slot: u64) {
    info!(
        event = "fault.injected",
        kind = %kind,
        validator_index,
        slot,
    );
}
