//! Slashable fault injection.
//!
//! Both injections target `head_slot - 1`, sign with the validators' own
//! keys, and submit to endpoint 0 only. Submissions are never retried.

use async_trait::async_trait;
use chainrig_api::{
    signing_root, Attestation, AttestationData, AttesterDuty, BeaconBlockHeader, DomainType,
    Epoch, Root, SignedBlockProposal,
};
use tracing::{debug, info, warn};

use crate::error::{EvalError, EvalResult};
use crate::evaluation::context::EvaluationContext;
use crate::evaluation::evaluator::{Evaluation, NetworkHandles};
use crate::evaluation::retry::retry_read;
use crate::obs;

/// Submits conflicting attestations for up to `targets` validators of the
/// committee at `head_slot - 1`.
#[derive(Debug, Clone)]
pub struct DoubleVoteInjection {
    pub targets: usize,
}

impl Default for DoubleVoteInjection {
    fn default() -> Self {
        Self { targets: 2 }
    }
}

#[async_trait]
impl Evaluation for DoubleVoteInjection {
    async fn evaluate(
        &self,
        _epoch: Epoch,
        ctx: &EvaluationContext,
        net: &NetworkHandles,
    ) -> EvalResult<()> {
        let api = net.primary()?;
        let cancel = ctx.cancel_token();
        let head = retry_read(net.retry(), cancel, "chain_head", || api.chain_head()).await?;
        if head.slot == 0 {
            return Err(EvalError::Precondition(
                "head is at genesis, no previous slot to vote on".to_string(),
            ));
        }
        let slot = head.slot - 1;
        let duty_epoch = net.spec().epoch_of(slot);

        let duties =
            retry_read(net.retry(), cancel, "attester_duties", || api.attester_duties(duty_epoch))
                .await?;
        let mut committee: Vec<&AttesterDuty> = duties.iter().filter(|d| d.slot == slot).collect();
        committee.sort_by_key(|d| (d.committee_index, d.committee_position));

        let domain = retry_read(net.retry(), cancel, "signing_domain", || {
            api.signing_domain(DomainType::BeaconAttester, duty_epoch)
        })
        .await?;

        let _injecting = ctx.begin_injection().await;
        let mut injected = Vec::new();
        for duty in &committee {
            if injected.len() == self.targets {
                break;
            }
            if ctx.ledger().contains(duty.validator_index) {
                debug!(validator_index = duty.validator_index, "already injected, skipping");
                continue;
            }

            let data = AttestationData {
                slot,
                committee_index: duty.committee_index,
                beacon_block_root: ctx.fabricated_root(),
                source_epoch: duty_epoch.saturating_sub(1),
                target_epoch: duty_epoch,
                target_root: head.block_root,
            };
            let root = signing_root(&data.hash_root(), &domain);
            let signature = net.signer().sign(duty.validator_index, root.as_bytes())?;
            api.submit_attestation(&Attestation {
                validator_index: duty.validator_index,
                data,
                signature,
            })
            .await?;

            if !ctx.ledger().try_record(duty.validator_index) {
                debug!(validator_index = duty.validator_index, "claimed concurrently, not counted");
                continue;
            }
            obs::emit_fault_injected("double_vote", duty.validator_index, slot);
            injected.push(duty.validator_index);
        }

        if injected.is_empty() {
            return Err(EvalError::Violation(format!(
                "no eligible validator in the {}-member committee at slot {slot}",
                committee.len()
            )));
        }
        if injected.len() < self.targets {
            warn!(
                slot,
                wanted = self.targets,
                injected = injected.len(),
                committee = committee.len(),
                "committee too small, fewer double votes injected than requested"
            );
        }
        info!(slot, validators = ?injected, "double votes injected");
        Ok(())
    }
}

/// Submits two proposals for `head_slot - 1` signed by its proposer that
/// differ only in a wrong state root. Both must be rejected.
#[derive(Debug, Clone, Default)]
pub struct DoubleBlockInjection;

#[async_trait]
impl Evaluation for DoubleBlockInjection {
    async fn evaluate(
        &self,
        _epoch: Epoch,
        ctx: &EvaluationContext,
        net: &NetworkHandles,
    ) -> EvalResult<()> {
        let api = net.primary()?;
        let cancel = ctx.cancel_token();
        let head = retry_read(net.retry(), cancel, "chain_head", || api.chain_head()).await?;
        if head.slot < 2 {
            return Err(EvalError::Precondition(format!(
                "head slot {} too early to propose a past block",
                head.slot
            )));
        }
        let slot = head.slot - 1;
        let duty_epoch = net.spec().epoch_of(slot);

        let duties =
            retry_read(net.retry(), cancel, "proposer_duties", || api.proposer_duties(duty_epoch))
                .await?;
        let proposer = duties
            .iter()
            .find(|d| d.slot == slot)
            .map(|d| d.validator_index)
            .ok_or_else(|| EvalError::Precondition(format!("no proposer duty for slot {slot}")))?;

        let domain = retry_read(net.retry(), cancel, "signing_domain", || {
            api.signing_domain(DomainType::BeaconProposer, duty_epoch)
        })
        .await?;

        let _injecting = ctx.begin_injection().await;
        let body_root = Root::hash(b"chainrig/double-block");
        for attempt in 0..2 {
            let header = BeaconBlockHeader {
                slot,
                proposer_index: proposer,
                parent_root: head.block_root,
                state_root: ctx.fabricated_root(),
                body_root,
            };
            let root = signing_root(&header.hash_root(), &domain);
            let signature = net.signer().sign(proposer, root.as_bytes())?;

            match api
                .submit_block(&SignedBlockProposal { header, signature })
                .await
            {
                Ok(()) => {
                    return Err(EvalError::ExpectedRejection {
                        what: "block".to_string(),
                        endpoint: api.endpoint().to_string(),
                    })
                }
                Err(e) if e.is_rejection() => {
                    debug!(attempt, proposer, slot, reason = %e, "proposal rejected as expected");
                }
                Err(e) => return Err(e.into()),
            }
        }

        if ctx.ledger().try_record(proposer) {
            obs::emit_fault_injected("double_block", proposer, slot);
        } else {
            debug!(proposer, "proposer already in the ledger");
        }
        Ok(())
    }
}
