//! Fault injection against endpoints that interleave or misbehave.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chainrig_api::{
    ApiResult, Attestation, AttesterDuty, BeaconApi, ChainHead, ChainSpec, Domain, DomainType,
    Epoch, ProposerDuty, SignedBlockProposal, SimulatedNetwork, SimulatedNetworkConfig, Validator,
    ValidatorIndex, ValidatorPerformance,
};
use chainrig_core::evaluators::{DoubleBlockInjection, DoubleVoteInjection};
use chainrig_core::{
    on_epoch, EvalError, Evaluation, EvaluationContext, EvaluationScheduler, Evaluator,
    NetworkHandles, SchedulerConfig,
};
use tokio_util::sync::CancellationToken;

const SLOT: Duration = Duration::from_millis(100);

/// Yields before every call so concurrent evaluations interleave. Optionally
/// accepts every block proposal from the `accept_from`-th one on.
struct InterleavingEndpoint {
    inner: Arc<dyn BeaconApi>,
    accept_from: Option<usize>,
    proposals: AtomicUsize,
}

#[async_trait]
impl BeaconApi for InterleavingEndpoint {
    fn endpoint(&self) -> &str {
        self.inner.endpoint()
    }

    async fn chain_head(&self) -> ApiResult<ChainHead> {
        tokio::task::yield_now().await;
        self.inner.chain_head().await
    }

    async fn validator(&self, index: ValidatorIndex) -> ApiResult<Validator> {
        tokio::task::yield_now().await;
        self.inner.validator(index).await
    }

    async fn validator_count(&self) -> ApiResult<u64> {
        tokio::task::yield_now().await;
        self.inner.validator_count().await
    }

    async fn attester_duties(&self, epoch: Epoch) -> ApiResult<Vec<AttesterDuty>> {
        tokio::task::yield_now().await;
        self.inner.attester_duties(epoch).await
    }

    async fn proposer_duties(&self, epoch: Epoch) -> ApiResult<Vec<ProposerDuty>> {
        tokio::task::yield_now().await;
        self.inner.proposer_duties(epoch).await
    }

    async fn signing_domain(&self, domain_type: DomainType, epoch: Epoch) -> ApiResult<Domain> {
        tokio::task::yield_now().await;
        self.inner.signing_domain(domain_type, epoch).await
    }

    async fn submit_attestation(&self, attestation: &Attestation) -> ApiResult<()> {
        tokio::task::yield_now().await;
        self.inner.submit_attestation(attestation).await
    }

    async fn submit_block(&self, proposal: &SignedBlockProposal) -> ApiResult<()> {
        tokio::task::yield_now().await;
        let n = self.proposals.fetch_add(1, Ordering::SeqCst);
        if self.accept_from.is_some_and(|k| n >= k) {
            return Ok(());
        }
        self.inner.submit_block(proposal).await
    }

    async fn validator_performance(
        &self,
        from: Epoch,
        to: Epoch,
    ) -> ApiResult<Vec<ValidatorPerformance>> {
        tokio::task::yield_now().await;
        self.inner.validator_performance(from, to).await
    }
}

fn network(
    validators: u64,
    seed: u64,
    accept_from: Option<usize>,
) -> (Arc<SimulatedNetwork>, NetworkHandles) {
    let net = SimulatedNetwork::new(SimulatedNetworkConfig {
        spec: ChainSpec::default().with_slot_duration(SLOT),
        validator_count: validators,
        seed,
    });
    let endpoints = net
        .endpoints(2)
        .into_iter()
        .map(|inner| {
            Arc::new(InterleavingEndpoint {
                inner,
                accept_from,
                proposals: AtomicUsize::new(0),
            }) as Arc<dyn BeaconApi>
        })
        .collect();
    let handles = NetworkHandles::new(endpoints, net.keystore(), net.spec().clone());
    (net, handles)
}

#[tokio::test(start_paused = true)]
async fn concurrent_double_votes_never_share_a_target() {
    let (net, handles) = network(64, 31, None);
    let scheduler = EvaluationScheduler::new(
        SchedulerConfig {
            epochs: 1,
            parallel: true,
            epoch_timeout: Duration::from_secs(30),
            poll_interval: SLOT,
        },
        vec![
            Evaluator::new("double_vote_a", on_epoch(1), DoubleVoteInjection::default()),
            Evaluator::new("double_vote_b", on_epoch(1), DoubleVoteInjection::default()),
        ],
    );
    let ctx = EvaluationContext::new(31, CancellationToken::new());

    let outcome = scheduler.run(&ctx, &handles).await;

    assert!(outcome.passed(), "{:?}", outcome.result);
    let ledger = ctx.ledger().indices();
    assert_eq!(ledger.len(), 4, "each injector claims two distinct validators");
    assert_eq!(net.submissions_to("beacon-node-0"), 4);
    assert_eq!(net.slashed_indices(), ledger);
}

#[tokio::test(start_paused = true)]
async fn double_block_fails_when_only_the_second_proposal_is_accepted() {
    let (net, handles) = network(32, 32, Some(1));
    tokio::time::sleep(SLOT * 48).await;
    let ctx = EvaluationContext::new(32, CancellationToken::new());

    let err = DoubleBlockInjection.evaluate(6, &ctx, &handles).await.unwrap_err();

    assert!(matches!(err, EvalError::ExpectedRejection { .. }), "{err}");
    assert!(err.to_string().contains("expected block to fail processing"));
    assert!(ctx.ledger().is_empty());
    // Only the first proposal reached the network, and it was rejected.
    assert_eq!(net.submissions_to("beacon-node-0"), 1);
}
