//! Trait definitions for talking to the network under test.
//!
//! - `BeaconApi`: query/mutation surface of one beacon node endpoint
//! - `ValidatorSigner`: signs messages on behalf of a validator index
//!
//! Both are backend-agnostic. An in-memory implementation lives in the
//! `fakes` module.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ApiError, ApiResult};
use crate::types::*;

/// One beacon node endpoint of the network under test.
///
/// Calls are independent and may be issued concurrently. Implementations
/// return [`ApiError::Rejected`] for protocol-level refusals and
/// [`ApiError::Transport`] when the node could not be reached.
#[async_trait]
pub trait BeaconApi: Send + Sync {
    /// Human-readable endpoint name used in errors and logs.
    fn endpoint(&self) -> &str;

    /// Current canonical head.
    async fn chain_head(&self) -> ApiResult<ChainHead>;

    /// Registry entry for `index`. Returns `NotFound` past the registry end.
    async fn validator(&self, index: ValidatorIndex) -> ApiResult<Validator>;

    /// Number of validators in the registry.
    async fn validator_count(&self) -> ApiResult<u64>;

    /// Attester duties for every validator in `epoch`.
    async fn attester_duties(&self, epoch: Epoch) -> ApiResult<Vec<AttesterDuty>>;

    /// Proposer duties for every slot in `epoch`.
    async fn proposer_duties(&self, epoch: Epoch) -> ApiResult<Vec<ProposerDuty>>;

    /// Signing domain for `domain_type` at `epoch`.
    async fn signing_domain(&self, domain_type: DomainType, epoch: Epoch) -> ApiResult<Domain>;

    /// Submit a signed attestation to this node's pool.
    async fn submit_attestation(&self, attestation: &Attestation) -> ApiResult<()>;

    /// Submit a signed block proposal for processing.
    async fn submit_block(&self, proposal: &SignedBlockProposal) -> ApiResult<()>;

    /// Balance movement of every validator for each epoch in `[from, to)`.
    async fn validator_performance(
        &self,
        from: Epoch,
        to: Epoch,
    ) -> ApiResult<Vec<ValidatorPerformance>>;
}

/// Signs on behalf of validators of the network under test.
pub trait ValidatorSigner: Send + Sync {
    fn sign(&self, validator_index: ValidatorIndex, message: &[u8]) -> ApiResult<Vec<u8>>;
}

/// Wraps a [`BeaconApi`] so that every call is bounded by `deadline`.
pub struct DeadlineApi {
    inner: Arc<dyn BeaconApi>,
    deadline: Duration,
}

impl DeadlineApi {
    pub fn new(inner: Arc<dyn BeaconApi>, deadline: Duration) -> Self {
        Self { inner, deadline }
    }

    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = ApiResult<T>> + Send,
    ) -> ApiResult<T> {
        tokio::time::timeout(self.deadline, fut)
            .await
            .map_err(|_| ApiError::DeadlineExceeded {
                endpoint: self.inner.endpoint().to_string(),
                deadline: self.deadline,
            })?
    }
}

#[async_trait]
impl BeaconApi for DeadlineApi {
    fn endpoint(&self) -> &str {
        self.inner.endpoint()
    }

    async fn chain_head(&self) -> ApiResult<ChainHead> {
        self.bounded(self.inner.chain_head()).await
    }

    async fn validator(&self, index: ValidatorIndex) -> ApiResult<Validator> {
        self.bounded(self.inner.validator(index)).await
    }

    async fn validator_count(&self) -> ApiResult<u64> {
        self.bounded(self.inner.validator_count()).await
    }

    async fn attester_duties(&self, epoch: Epoch) -> ApiResult<Vec<AttesterDuty>> {
        self.bounded(self.inner.attester_duties(epoch)).await
    }

    async fn proposer_duties(&self, epoch: Epoch) -> ApiResult<Vec<ProposerDuty>> {
        self.bounded(self.inner.proposer_duties(epoch)).await
    }

    async fn signing_domain(&self, domain_type: DomainType, epoch: Epoch) -> ApiResult<Domain> {
        self.bounded(self.inner.signing_domain(domain_type, epoch))
            .await
    }

    async fn submit_attestation(&self, attestation: &Attestation) -> ApiResult<()> {
        self.bounded(self.inner.submit_attestation(attestation))
            .await
    }

    async fn submit_block(&self, proposal: &SignedBlockProposal) -> ApiResult<()> {
        self.bounded(self.inner.submit_block(proposal)).await
    }

    async fn validator_performance(
        &self,
        from: Epoch,
        to: Epoch,
    ) -> ApiResult<Vec<ValidatorPerformance>> {
        self.bounded(self.inner.validator_performance(from, to))
            .await
    }
}
