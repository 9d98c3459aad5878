//! Delayed checks that injected faults were punished.

use async_trait::async_trait;
use chainrig_api::{Epoch, ValidatorIndex};
use tracing::{debug, warn};

use crate::error::{EvalError, EvalResult};
use crate::evaluation::context::EvaluationContext;
use crate::evaluation::evaluator::{Evaluation, NetworkHandles};
use crate::evaluation::retry::retry_read;

/// Every validator in the fault ledger must be slashed.
#[derive(Debug, Clone, Default)]
pub struct ValidatorsSlashed;

#[async_trait]
impl Evaluation for ValidatorsSlashed {
    async fn evaluate(
        &self,
        epoch: Epoch,
        ctx: &EvaluationContext,
        net: &NetworkHandles,
    ) -> EvalResult<()> {
        let injected = ctx.ledger().indices();
        if injected.is_empty() {
            warn!(epoch, "no injected faults recorded, nothing to check");
            return Ok(());
        }
        let api = net.primary()?;

        let mut not_slashed: Vec<ValidatorIndex> = Vec::new();
        for &index in &injected {
            let validator = retry_read(net.retry(), ctx.cancel_token(), "validator", || {
                api.validator(index)
            })
            .await?;
            if !validator.slashed {
                not_slashed.push(index);
            }
        }

        if !not_slashed.is_empty() {
            return Err(EvalError::Violation(format!(
                "expected {} slashed validators, found {}; not slashed: {:?}",
                injected.len(),
                injected.len() - not_slashed.len(),
                not_slashed
            )));
        }
        debug!(epoch, count = injected.len(), "all injected validators slashed");
        Ok(())
    }
}

/// Every validator in the fault ledger must have an effective balance
/// below the post-slashing threshold.
#[derive(Debug, Clone, Default)]
pub struct SlashedValidatorsLoseBalance;

#[async_trait]
impl Evaluation for SlashedValidatorsLoseBalance {
    async fn evaluate(
        &self,
        _epoch: Epoch,
        ctx: &EvaluationContext,
        net: &NetworkHandles,
    ) -> EvalResult<()> {
        let api = net.primary()?;
        let threshold = net.spec().slashed_balance_threshold();

        let mut offenders = Vec::new();
        for index in ctx.ledger().indices() {
            let validator = retry_read(net.retry(), ctx.cancel_token(), "validator", || {
                api.validator(index)
            })
            .await?;
            if validator.effective_balance >= threshold {
                offenders.push(format!(
                    "validator {index} has effective balance {}",
                    validator.effective_balance
                ));
            }
        }

        if offenders.is_empty() {
            Ok(())
        } else {
            Err(EvalError::Violation(format!(
                "slashed validators did not lose balance (threshold {threshold}): {}",
                offenders.join("; ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluators::slashing::DoubleVoteInjection;
    use chainrig_api::{ChainSpec, SimulatedNetwork, SimulatedNetworkConfig};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn handles() -> NetworkHandles {
        let net = SimulatedNetwork::new(SimulatedNetworkConfig {
            spec: ChainSpec::default().with_slot_duration(Duration::from_millis(100)),
            validator_count: 32,
            seed: 8,
        });
        NetworkHandles::new(net.endpoints(1), net.keystore(), net.spec().clone())
    }

    #[tokio::test(start_paused = true)]
    async fn test_unslashed_ledger_entry_is_a_violation() {
        let handles = handles();
        let ctx = EvaluationContext::new(0, CancellationToken::new());
        ctx.ledger().try_record(4);

        let err = ValidatorsSlashed.evaluate(8, &ctx, &handles).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("expected 1 slashed validators, found 0"), "{msg}");

        let err = SlashedValidatorsLoseBalance
            .evaluate(8, &ctx, &handles)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("validator 4"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_injected_validators_pass_both_checks() {
        let handles = handles();
        tokio::time::sleep(Duration::from_millis(4_000)).await;
        let ctx = EvaluationContext::new(0, CancellationToken::new());
        DoubleVoteInjection::default()
            .evaluate(5, &ctx, &handles)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        ValidatorsSlashed.evaluate(8, &ctx, &handles).await.unwrap();
        SlashedValidatorsLoseBalance
            .evaluate(8, &ctx, &handles)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_empty_ledger_passes() {
        let ctx = EvaluationContext::new(0, CancellationToken::new());
        ValidatorsSlashed.evaluate(8, &ctx, &handles()).await.unwrap();
    }
}
