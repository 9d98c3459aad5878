//! Balance history collection for the run report.

use async_trait::async_trait;
use chainrig_api::Epoch;
use tracing::debug;

use crate::error::EvalResult;
use crate::evaluation::context::EvaluationContext;
use crate::evaluation::evaluator::{Evaluation, NetworkHandles};
use crate::evaluation::retry::retry_read;

/// Appends per-validator balance rows for every completed epoch not yet
/// recorded in the context.
#[derive(Debug, Clone, Default)]
pub struct BalanceHistory;

#[async_trait]
impl Evaluation for BalanceHistory {
    async fn evaluate(
        &self,
        epoch: Epoch,
        ctx: &EvaluationContext,
        net: &NetworkHandles,
    ) -> EvalResult<()> {
        let from = ctx.history_next_epoch();
        if from >= epoch {
            return Ok(());
        }
        let api = net.primary()?;
        let rows = retry_read(net.retry(), ctx.cancel_token(), "validator_performance", || {
            api.validator_performance(from, epoch)
        })
        .await?;
        debug!(from, to = epoch, rows = rows.len(), "balance history recorded");
        ctx.record_balances(rows, epoch);
        Ok(())
    }
}
