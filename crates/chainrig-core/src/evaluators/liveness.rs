//! Liveness checks: endpoints answer, finality advances, validators vote.

use async_trait::async_trait;
use chainrig_api::Epoch;
use tracing::debug;

use crate::error::{EvalError, EvalResult};
use crate::evaluation::context::EvaluationContext;
use crate::evaluation::evaluator::{Evaluation, NetworkHandles};
use crate::evaluation::retry::retry_read;

/// Every endpoint answers `chain_head`.
#[derive(Debug, Clone, Default)]
pub struct Healthz;

#[async_trait]
impl Evaluation for Healthz {
    async fn evaluate(
        &self,
        epoch: Epoch,
        ctx: &EvaluationContext,
        net: &NetworkHandles,
    ) -> EvalResult<()> {
        if net.endpoints().is_empty() {
            return Err(EvalError::Precondition("no beacon endpoints configured".to_string()));
        }
        for api in net.endpoints() {
            let head = retry_read(net.retry(), ctx.cancel_token(), "chain_head", || {
                api.chain_head()
            })
            .await?;
            debug!(epoch, endpoint = api.endpoint(), head_slot = head.slot, "endpoint healthy");
        }
        Ok(())
    }
}

/// Finalized epoch trails the head epoch by at most `max_lag` epochs.
#[derive(Debug, Clone)]
pub struct FinalizationOccurs {
    pub max_lag: Epoch,
}

impl Default for FinalizationOccurs {
    fn default() -> Self {
        Self { max_lag: 2 }
    }
}

#[async_trait]
impl Evaluation for FinalizationOccurs {
    async fn evaluate(
        &self,
        _epoch: Epoch,
        ctx: &EvaluationContext,
        net: &NetworkHandles,
    ) -> EvalResult<()> {
        let api = net.primary()?;
        let head = retry_read(net.retry(), ctx.cancel_token(), "chain_head", || api.chain_head())
            .await?;
        let head_epoch = net.spec().epoch_of(head.slot);
        let lag = head_epoch.saturating_sub(head.finalized_epoch);
        if lag > self.max_lag {
            return Err(EvalError::Violation(format!(
                "finalized epoch {} lags head epoch {head_epoch} by {lag} (max {})",
                head.finalized_epoch, self.max_lag
            )));
        }
        Ok(())
    }
}

/// Share of validators that participated in the previous epoch is at
/// least `threshold`. Validators in the fault ledger are excluded.
#[derive(Debug, Clone)]
pub struct ValidatorsParticipating {
    pub threshold: f64,
}

impl Default for ValidatorsParticipating {
    fn default() -> Self {
        Self { threshold: 0.95 }
    }
}

#[async_trait]
impl Evaluation for ValidatorsParticipating {
    async fn evaluate(
        &self,
        epoch: Epoch,
        ctx: &EvaluationContext,
        net: &NetworkHandles,
    ) -> EvalResult<()> {
        if epoch == 0 {
            return Ok(());
        }
        let api = net.primary()?;
        let rows = retry_read(net.retry(), ctx.cancel_token(), "validator_performance", || {
            api.validator_performance(epoch - 1, epoch)
        })
        .await?;

        let ledger = ctx.ledger();
        let eligible: Vec<_> = rows
            .iter()
            .filter(|r| !ledger.contains(r.validator_index))
            .collect();
        if eligible.is_empty() {
            return Ok(());
        }
        let participated = eligible.iter().filter(|r| r.participated).count();
        let rate = participated as f64 / eligible.len() as f64;
        if rate < self.threshold {
            return Err(EvalError::Violation(format!(
                "participation in epoch {} was {:.2}% ({participated}/{}), below {:.2}%",
                epoch - 1,
                rate * 100.0,
                eligible.len(),
                self.threshold * 100.0
            )));
        }
        Ok(())
    }
}
