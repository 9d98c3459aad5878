//! End-to-end run: bring the network up, evaluate it, tear it down.

use chainrig_api::ValidatorPerformance;
use chrono::Utc;
use tokio::time::Instant;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::error::RunError;
use crate::evaluation::context::EvaluationContext;
use crate::evaluation::evaluator::NetworkHandles;
use crate::evaluation::scheduler::EvaluationScheduler;
use crate::obs;
use crate::orchestrator::Orchestrator;
use crate::reporting::{FailureSummary, ProcessRow, RunReport, REPORT_SCHEMA_VERSION};

/// Everything a run produced.
#[derive(Debug)]
pub struct RunArtifacts {
    pub report: RunReport,
    pub balance_history: Vec<ValidatorPerformance>,
    pub result: Result<(), RunError>,
}

/// Start every component, run the scheduler against `net`, then stop
/// everything that was started. Components are stopped whether or not the
/// run passed.
pub async fn run_end_to_end(
    orchestrator: &Orchestrator,
    scheduler: &EvaluationScheduler,
    net: &NetworkHandles,
    seed: u64,
) -> RunArtifacts {
    let run_id = Uuid::new_v4();
    run_inner(run_id, orchestrator, scheduler, net, seed)
        .instrument(obs::run_span(&run_id.to_string()))
        .await
}

async fn run_inner(
    run_id: Uuid,
    orchestrator: &Orchestrator,
    scheduler: &EvaluationScheduler,
    net: &NetworkHandles,
    seed: u64,
) -> RunArtifacts {
    let started_at = Utc::now();
    let began = Instant::now();
    let epochs = scheduler.config().epochs;
    obs::emit_run_started(&run_id.to_string(), seed, epochs);

    let ctx = EvaluationContext::new(seed, orchestrator.cancel_token().child_token());

    let started = match orchestrator.run().await {
        Ok(()) => orchestrator.await_all_started().await,
        Err(e) => Err(e),
    };
    let (records, last_completed_epoch, result) = match started {
        Err(e) => (Vec::new(), None, Err(RunError::from(e))),
        Ok(()) => {
            info!(components = orchestrator.started_components().len(), "network up");
            let outcome = scheduler.run(&ctx, net).await;
            (
                outcome.records,
                outcome.last_completed_epoch,
                outcome.result.map_err(RunError::from),
            )
        }
    };

    let processes: Vec<ProcessRow> = orchestrator.process_ids().iter().map(ProcessRow::from).collect();
    for (component, err) in orchestrator.stop_all().await {
        warn!(component = %component, error = %err, "failed to stop component");
    }

    let passed = result.is_ok();
    let duration_ms = began.elapsed().as_millis() as u64;
    obs::emit_run_finished(&run_id.to_string(), duration_ms, records.len(), passed);

    let report = RunReport {
        schema_version: REPORT_SCHEMA_VERSION.to_string(),
        run_id,
        seed,
        started_at,
        finished_at: Utc::now(),
        epochs,
        last_completed_epoch,
        passed,
        evaluations: records,
        failure: result.as_ref().err().map(FailureSummary::from_error),
        processes,
        injected_faults: ctx.ledger().indices(),
    };

    RunArtifacts {
        report,
        balance_history: ctx.balance_history(),
        result,
    }
}
