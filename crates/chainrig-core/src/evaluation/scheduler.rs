//! Epoch-driven evaluation scheduler.
//!
//! For each epoch in `0..=epochs` the scheduler waits until the chain head
//! reaches the epoch's first slot, then runs every evaluator whose policy
//! holds. The first failure ends the run; failed evaluations are never
//! retried.

use std::time::Duration;

use chainrig_api::{Epoch, Slot};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::error::{EvalError, EvaluationFailure};
use crate::evaluation::context::EvaluationContext;
use crate::evaluation::evaluator::{Evaluator, NetworkHandles};
use crate::obs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Last epoch to evaluate (inclusive).
    pub epochs: Epoch,
    /// Dispatch evaluators due in the same epoch concurrently.
    pub parallel: bool,
    /// How long to wait for the head to reach one epoch.
    pub epoch_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            parallel: false,
            epoch_timeout: Duration::from_secs(600),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Outcome of one evaluation invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub name: String,
    pub epoch: Epoch,
    pub passed: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything the scheduler observed, plus how it ended.
#[derive(Debug)]
pub struct RunOutcome {
    pub records: Vec<EvaluationRecord>,
    /// Highest epoch whose due evaluators all passed.
    pub last_completed_epoch: Option<Epoch>,
    pub result: Result<(), EvaluationFailure>,
}

impl RunOutcome {
    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct EvaluationScheduler {
    config: SchedulerConfig,
    evaluators: Vec<Evaluator>,
}

impl EvaluationScheduler {
    pub fn new(config: SchedulerConfig, evaluators: Vec<Evaluator>) -> Self {
        Self { config, evaluators }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn evaluators(&self) -> &[Evaluator] {
        &self.evaluators
    }

    #[instrument(skip_all, fields(epochs = self.config.epochs, evaluators = self.evaluators.len()))]
    pub async fn run(&self, ctx: &EvaluationContext, net: &NetworkHandles) -> RunOutcome {
        let mut records = Vec::new();
        let mut last_completed_epoch = None;

        for epoch in 0..=self.config.epochs {
            if let Err(failure) = self.wait_for_epoch(epoch, ctx, net).await {
                return RunOutcome {
                    records,
                    last_completed_epoch,
                    result: Err(failure),
                };
            }

            let due: Vec<&Evaluator> = self.evaluators.iter().filter(|e| e.is_due(epoch)).collect();
            debug!(epoch, due = due.len(), "evaluators due");

            if let Err(failure) = self.run_due(&due, epoch, ctx, net, &mut records).await {
                return RunOutcome {
                    records,
                    last_completed_epoch,
                    result: Err(failure),
                };
            }
            last_completed_epoch = Some(epoch);
        }

        info!(records = records.len(), "all epochs evaluated");
        RunOutcome {
            records,
            last_completed_epoch,
            result: Ok(()),
        }
    }

    async fn run_due(
        &self,
        due: &[&Evaluator],
        epoch: Epoch,
        ctx: &EvaluationContext,
        net: &NetworkHandles,
        records: &mut Vec<EvaluationRecord>,
    ) -> Result<(), EvaluationFailure> {
        if self.config.parallel {
            let results =
                join_all(due.iter().map(|ev| run_one(ev, epoch, ctx, net))).await;
            let mut first_failure = None;
            for (record, result) in results {
                records.push(record);
                if let Err(f) = result {
                    first_failure.get_or_insert(f);
                }
            }
            return first_failure.map_or(Ok(()), Err);
        }

        for ev in due {
            if ctx.is_cancelled() {
                return Err(EvaluationFailure::Cancelled { epoch });
            }
            let (record, result) = run_one(ev, epoch, ctx, net).await;
            records.push(record);
            result?;
        }
        Ok(())
    }

    /// Poll the primary endpoint until its head reaches `epoch`.
    async fn wait_for_epoch(
        &self,
        epoch: Epoch,
        ctx: &EvaluationContext,
        net: &NetworkHandles,
    ) -> Result<(), EvaluationFailure> {
        let target: Slot = net.spec().start_slot(epoch);
        let began = Instant::now();
        let deadline = began + self.config.epoch_timeout;
        let mut last_slot = None;

        loop {
            if ctx.is_cancelled() {
                return Err(EvaluationFailure::Cancelled { epoch });
            }
            match net.primary().map(|api| api.chain_head()) {
                Ok(head) => match head.await {
                    Ok(head) if head.slot >= target => {
                        obs::emit_epoch_reached(epoch, head.slot);
                        return Ok(());
                    }
                    Ok(head) => last_slot = Some(head.slot),
                    Err(e) => debug!(epoch, error = %e, "chain head poll failed"),
                },
                Err(e) => {
                    return Err(EvaluationFailure::Evaluation {
                        evaluator: "epoch-wait".to_string(),
                        epoch,
                        source: e,
                    })
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(EvaluationFailure::EpochTimeout {
                    epoch,
                    waited: now - began,
                    last_slot,
                });
            }
            tokio::select! {
                _ = ctx.cancel_token().cancelled() => {
                    return Err(EvaluationFailure::Cancelled { epoch });
                }
                _ = tokio::time::sleep(self.config.poll_interval.min(deadline - now)) => {}
            }
        }
    }
}

async fn run_one(
    ev: &Evaluator,
    epoch: Epoch,
    ctx: &EvaluationContext,
    net: &NetworkHandles,
) -> (EvaluationRecord, Result<(), EvaluationFailure>) {
    let name = ev.name_at(epoch);
    let began = Instant::now();
    let result = tokio::select! {
        _ = ctx.cancel_token().cancelled() => Err(EvalError::Cancelled),
        r = ev.evaluation().evaluate(epoch, ctx, net) => r,
    };
    let duration_ms = began.elapsed().as_millis() as u64;

    match result {
        Ok(()) => {
            obs::emit_evaluation_passed(&name, epoch, duration_ms);
            (
                EvaluationRecord {
                    name,
                    epoch,
                    passed: true,
                    duration_ms,
                    error: None,
                },
                Ok(()),
            )
        }
        Err(source) => {
            obs::emit_evaluation_failed(&name, epoch, &source);
            let record = EvaluationRecord {
                name: name.clone(),
                epoch,
                passed: false,
                duration_ms,
                error: Some(source.to_string()),
            };
            let failure = match source {
                EvalError::Cancelled => EvaluationFailure::Cancelled { epoch },
                source => EvaluationFailure::Evaluation {
                    evaluator: name,
                    epoch,
                    source,
                },
            };
            (record, Err(failure))
        }
    }
}
