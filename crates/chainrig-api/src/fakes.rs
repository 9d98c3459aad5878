//! In-memory simulated beacon network (testing and dry runs)
//!
//! `SimulatedNetwork` models just enough of a beacon chain to exercise the
//! evaluation engine end to end:
//! - a slot clock driven by `tokio::time` (works with paused time)
//! - deterministic attester committees and proposers
//! - signature checks against the `DeterministicKeystore`
//! - attester and proposer slashing when conflicting messages are seen
//! - proposal validation by state root
//! - finality trailing the head by two epochs
//!
//! Every validator implicitly casts the honest vote and proposes the honest
//! block for its duties once the slot has passed, so a single fabricated
//! message is enough to conflict with the canonical one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::api::BeaconApi;
use crate::error::{ApiError, ApiResult};
use crate::keys::DeterministicKeystore;
use crate::spec::ChainSpec;
use crate::types::*;

/// Parameters of a simulated network.
#[derive(Debug, Clone)]
pub struct SimulatedNetworkConfig {
    pub spec: ChainSpec,
    pub validator_count: u64,
    pub seed: u64,
}

impl Default for SimulatedNetworkConfig {
    fn default() -> Self {
        Self {
            spec: ChainSpec::default(),
            validator_count: 64,
            seed: 0,
        }
    }
}

#[derive(Debug)]
struct SimState {
    /// Epoch in which each slashed validator was slashed.
    slashed_at: HashMap<ValidatorIndex, Epoch>,
    /// Externally submitted votes, keyed by (validator, target epoch).
    votes: HashMap<(ValidatorIndex, Epoch), Root>,
    /// Externally submitted headers, keyed by (proposer, slot).
    headers: HashMap<(ValidatorIndex, Slot), Root>,
    /// Number of upcoming requests that fail with a transport error.
    transport_failures: u32,
    validate_blocks: bool,
    submissions: HashMap<String, usize>,
}

/// A shared, in-memory beacon network. Hand out per-node views with
/// [`SimulatedNetwork::endpoints`].
#[derive(Debug)]
pub struct SimulatedNetwork {
    config: SimulatedNetworkConfig,
    keystore: Arc<DeterministicKeystore>,
    genesis: Instant,
    genesis_validators_root: Root,
    state: Mutex<SimState>,
}

impl SimulatedNetwork {
    /// Create a network whose genesis is "now".
    pub fn new(config: SimulatedNetworkConfig) -> Arc<Self> {
        let keystore = Arc::new(DeterministicKeystore::new(
            config.seed,
            config.validator_count,
        ));
        let mut gvr = Vec::new();
        gvr.extend_from_slice(b"genesis-validators");
        gvr.extend_from_slice(&config.seed.to_le_bytes());
        gvr.extend_from_slice(&config.validator_count.to_le_bytes());

        Arc::new(Self {
            genesis_validators_root: Root::hash(&gvr),
            keystore,
            genesis: Instant::now(),
            config,
            state: Mutex::new(SimState {
                slashed_at: HashMap::new(),
                votes: HashMap::new(),
                headers: HashMap::new(),
                transport_failures: 0,
                validate_blocks: true,
                submissions: HashMap::new(),
            }),
        })
    }

    pub fn spec(&self) -> &ChainSpec {
        &self.config.spec
    }

    /// Keys of every validator; also usable as the harness signer.
    pub fn keystore(&self) -> Arc<DeterministicKeystore> {
        Arc::clone(&self.keystore)
    }

    /// One API view per beacon node, named `beacon-node-<i>`.
    pub fn endpoints(self: &Arc<Self>, count: usize) -> Vec<Arc<dyn BeaconApi>> {
        (0..count)
            .map(|i| {
                Arc::new(SimulatedEndpoint {
                    name: format!("beacon-node-{i}"),
                    network: Arc::clone(self),
                }) as Arc<dyn BeaconApi>
            })
            .collect()
    }

    /// Make the next `n` requests (on any endpoint) fail with a transport error.
    pub fn fail_next_requests(&self, n: u32) {
        self.lock().transport_failures = n;
    }

    /// Toggle state-root validation of submitted blocks.
    pub fn set_block_validation(&self, enabled: bool) {
        self.lock().validate_blocks = enabled;
    }

    /// Number of attestations and blocks submitted through `endpoint`.
    pub fn submissions_to(&self, endpoint: &str) -> usize {
        self.lock().submissions.get(endpoint).copied().unwrap_or(0)
    }

    /// Indices slashed so far, ascending.
    pub fn slashed_indices(&self) -> Vec<ValidatorIndex> {
        let mut v: Vec<_> = self.lock().slashed_at.keys().copied().collect();
        v.sort_unstable();
        v
    }

    pub fn head_slot(&self) -> Slot {
        let slot_ms = self.config.spec.slot_duration_ms.max(1) as u128;
        (self.genesis.elapsed().as_millis() / slot_ms) as Slot
    }

    fn current_epoch(&self) -> Epoch {
        self.config.spec.epoch_of(self.head_slot())
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn seeded_root(&self, tag: &[u8], slot: Slot) -> Root {
        let mut buf = Vec::with_capacity(tag.len() + 16);
        buf.extend_from_slice(tag);
        buf.extend_from_slice(&self.config.seed.to_le_bytes());
        buf.extend_from_slice(&slot.to_le_bytes());
        Root::hash(&buf)
    }

    fn canonical_block_root(&self, slot: Slot) -> Root {
        self.seeded_root(b"block", slot)
    }

    fn canonical_state_root(&self, slot: Slot) -> Root {
        self.seeded_root(b"state", slot)
    }

    fn proposer_at(&self, slot: Slot) -> ValidatorIndex {
        let root = self.seeded_root(b"proposer", slot);
        let mut word = [0u8; 8];
        word.copy_from_slice(&root.as_bytes()[..8]);
        u64::from_le_bytes(word) % self.config.validator_count.max(1)
    }

    fn attester_slot(&self, index: ValidatorIndex, epoch: Epoch) -> Slot {
        let spe = self.config.spec.slots_per_epoch;
        self.config.spec.start_slot(epoch) + (index + epoch) % spe
    }

    fn honest_vote(&self, index: ValidatorIndex, epoch: Epoch) -> AttestationData {
        let slot = self.attester_slot(index, epoch);
        AttestationData {
            slot,
            committee_index: 0,
            beacon_block_root: self.canonical_block_root(slot),
            source_epoch: epoch.saturating_sub(1),
            target_epoch: epoch,
            target_root: self.canonical_block_root(self.config.spec.start_slot(epoch)),
        }
    }

    fn honest_header(&self, slot: Slot) -> BeaconBlockHeader {
        BeaconBlockHeader {
            slot,
            proposer_index: self.proposer_at(slot),
            parent_root: self.canonical_block_root(slot.saturating_sub(1)),
            state_root: self.canonical_state_root(slot),
            body_root: self.seeded_root(b"body", slot),
        }
    }

    fn domain(&self, domain_type: DomainType) -> Domain {
        let mut buf = Vec::with_capacity(40);
        buf.extend_from_slice(&domain_type.bytes());
        buf.extend_from_slice(&self.config.spec.fork_version);
        buf.extend_from_slice(self.genesis_validators_root.as_bytes());
        Domain(Root::hash(&buf))
    }

    fn balances_for(&self, slashed: bool) -> Gwei {
        let spec = &self.config.spec;
        if slashed {
            spec.max_effective_balance - spec.min_slashing_penalty()
        } else {
            spec.max_effective_balance
        }
    }

    fn slash(&self, state: &mut SimState, index: ValidatorIndex, reason: &str) {
        if state.slashed_at.contains_key(&index) {
            return;
        }
        let epoch = self.current_epoch();
        state.slashed_at.insert(index, epoch);
        info!(validator_index = index, epoch, reason, "validator slashed");
    }

    fn check_transport(&self, endpoint: &str) -> ApiResult<()> {
        let mut state = self.lock();
        if state.transport_failures > 0 {
            state.transport_failures -= 1;
            return Err(ApiError::Transport {
                endpoint: endpoint.to_string(),
                reason: "simulated connection reset".to_string(),
            });
        }
        Ok(())
    }

    fn check_validator(&self, endpoint: &str, index: ValidatorIndex) -> ApiResult<()> {
        if index >= self.config.validator_count {
            return Err(rejected(endpoint, format!("unknown validator {index}")));
        }
        Ok(())
    }

    fn process_attestation(&self, endpoint: &str, att: &Attestation) -> ApiResult<()> {
        self.check_validator(endpoint, att.validator_index)?;
        let spec = &self.config.spec;
        let head = self.head_slot();
        let data = &att.data;

        if data.slot > head {
            return Err(rejected(endpoint, "attestation slot is in the future"));
        }
        if data.target_epoch != spec.epoch_of(data.slot) {
            return Err(rejected(endpoint, "target epoch does not match slot"));
        }
        let root = signing_root(&data.hash_root(), &self.domain(DomainType::BeaconAttester));
        if !self
            .keystore
            .verify(att.validator_index, root.as_bytes(), &att.signature)
        {
            return Err(rejected(endpoint, "invalid attestation signature"));
        }

        let mut state = self.lock();
        *state.submissions.entry(endpoint.to_string()).or_default() += 1;

        let key = (att.validator_index, data.target_epoch);
        let submitted = data.hash_root();
        let previous = state.votes.get(&key).copied().or_else(|| {
            let honest = self.honest_vote(att.validator_index, data.target_epoch);
            let slashed_before = state
                .slashed_at
                .get(&att.validator_index)
                .is_some_and(|&e| e < data.target_epoch);
            (honest.slot <= head && !slashed_before).then(|| honest.hash_root())
        });

        match previous {
            Some(prev) if prev != submitted => {
                self.slash(&mut state, att.validator_index, "attester double vote");
            }
            Some(_) => {}
            None => {
                state.votes.insert(key, submitted);
            }
        }
        debug!(endpoint, validator_index = att.validator_index, slot = data.slot, "attestation accepted");
        Ok(())
    }

    fn process_block(&self, endpoint: &str, proposal: &SignedBlockProposal) -> ApiResult<()> {
        let header = &proposal.header;
        let head = self.head_slot();
        if header.slot == 0 || header.slot > head {
            return Err(rejected(endpoint, format!("cannot propose at slot {}", header.slot)));
        }
        let expected = self.proposer_at(header.slot);
        if header.proposer_index != expected {
            return Err(rejected(
                endpoint,
                format!(
                    "validator {} is not the proposer for slot {} (expected {expected})",
                    header.proposer_index, header.slot
                ),
            ));
        }
        let root = signing_root(&header.hash_root(), &self.domain(DomainType::BeaconProposer));
        if !self
            .keystore
            .verify(header.proposer_index, root.as_bytes(), &proposal.signature)
        {
            return Err(rejected(endpoint, "invalid proposal signature"));
        }

        let mut state = self.lock();
        *state.submissions.entry(endpoint.to_string()).or_default() += 1;

        let submitted = header.hash_root();
        let key = (header.proposer_index, header.slot);
        let previous = state
            .headers
            .get(&key)
            .copied()
            .unwrap_or_else(|| self.honest_header(header.slot).hash_root());
        if previous != submitted {
            self.slash(&mut state, header.proposer_index, "proposer double block");
        }
        state.headers.entry(key).or_insert(submitted);

        if state.validate_blocks && header.state_root != self.canonical_state_root(header.slot) {
            return Err(rejected(endpoint, "invalid state root"));
        }
        Ok(())
    }

    fn validator_record(&self, index: ValidatorIndex) -> ApiResult<Validator> {
        let pubkey = self.keystore.pubkey(index).ok_or_else(|| ApiError::NotFound {
            what: format!("validator {index}"),
        })?;
        let slashed = self.lock().slashed_at.contains_key(&index);
        let balance = self.balances_for(slashed);
        Ok(Validator {
            index,
            pubkey,
            effective_balance: balance,
            balance,
            slashed,
        })
    }

    fn ensure_lookahead(&self, epoch: Epoch) -> ApiResult<()> {
        if epoch > self.current_epoch() + 1 {
            return Err(ApiError::NotFound {
                what: format!("duties for epoch {epoch}"),
            });
        }
        Ok(())
    }

    fn attester_duties_at(&self, epoch: Epoch) -> Vec<AttesterDuty> {
        let spe = self.config.spec.slots_per_epoch;
        let mut duties: Vec<AttesterDuty> = (0..self.config.validator_count)
            .map(|index| AttesterDuty {
                validator_index: index,
                slot: self.attester_slot(index, epoch),
                committee_index: 0,
                committee_position: index / spe,
            })
            .collect();
        duties.sort_by_key(|d| (d.slot, d.committee_position));
        duties
    }

    fn performance(&self, from: Epoch, to: Epoch) -> ApiResult<Vec<ValidatorPerformance>> {
        if to > self.current_epoch() {
            return Err(ApiError::NotFound {
                what: format!("performance for epoch {} (not yet complete)", to.saturating_sub(1)),
            });
        }
        let slashed_at = self.lock().slashed_at.clone();
        let mut rows = Vec::new();
        for epoch in from..to {
            for index in 0..self.config.validator_count {
                let slashed = slashed_at.get(&index).copied();
                let before = self.balances_for(slashed.is_some_and(|s| s < epoch));
                let after = self.balances_for(slashed.is_some_and(|s| s <= epoch));
                rows.push(ValidatorPerformance {
                    epoch,
                    validator_index: index,
                    balance_before: before,
                    balance_after: after,
                    effective_balance: after,
                    participated: slashed.map_or(true, |s| s > epoch),
                });
            }
        }
        Ok(rows)
    }
}

fn rejected(endpoint: &str, reason: impl Into<String>) -> ApiError {
    ApiError::Rejected {
        endpoint: endpoint.to_string(),
        reason: reason.into(),
    }
}

/// One beacon node's view of a [`SimulatedNetwork`].
pub struct SimulatedEndpoint {
    name: String,
    network: Arc<SimulatedNetwork>,
}

#[async_trait]
impl BeaconApi for SimulatedEndpoint {
    fn endpoint(&self) -> &str {
        &self.name
    }

    async fn chain_head(&self) -> ApiResult<ChainHead> {
        self.network.check_transport(&self.name)?;
        let slot = self.network.head_slot();
        Ok(ChainHead {
            slot,
            block_root: self.network.canonical_block_root(slot),
            finalized_epoch: self.network.spec().epoch_of(slot).saturating_sub(2),
        })
    }

    async fn validator(&self, index: ValidatorIndex) -> ApiResult<Validator> {
        self.network.check_transport(&self.name)?;
        self.network.validator_record(index)
    }

    async fn validator_count(&self) -> ApiResult<u64> {
        self.network.check_transport(&self.name)?;
        Ok(self.network.config.validator_count)
    }

    async fn attester_duties(&self, epoch: Epoch) -> ApiResult<Vec<AttesterDuty>> {
        self.network.check_transport(&self.name)?;
        self.network.ensure_lookahead(epoch)?;
        Ok(self.network.attester_duties_at(epoch))
    }

    async fn proposer_duties(&self, epoch: Epoch) -> ApiResult<Vec<ProposerDuty>> {
        self.network.check_transport(&self.name)?;
        self.network.ensure_lookahead(epoch)?;
        let spec = self.network.spec();
        let start = spec.start_slot(epoch);
        Ok((start..start + spec.slots_per_epoch)
            .map(|slot| ProposerDuty {
                validator_index: self.network.proposer_at(slot),
                slot,
            })
            .collect())
    }

    async fn signing_domain(&self, domain_type: DomainType, _epoch: Epoch) -> ApiResult<Domain> {
        self.network.check_transport(&self.name)?;
        Ok(self.network.domain(domain_type))
    }

    async fn submit_attestation(&self, attestation: &Attestation) -> ApiResult<()> {
        self.network.check_transport(&self.name)?;
        self.network.process_attestation(&self.name, attestation)
    }

    async fn submit_block(&self, proposal: &SignedBlockProposal) -> ApiResult<()> {
        self.network.check_transport(&self.name)?;
        self.network.process_block(&self.name, proposal)
    }

    async fn validator_performance(
        &self,
        from: Epoch,
        to: Epoch,
    ) -> ApiResult<Vec<ValidatorPerformance>> {
        self.network.check_transport(&self.name)?;
        self.network.performance(from, to)
    }
}
