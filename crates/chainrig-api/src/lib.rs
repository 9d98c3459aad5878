//! chainrig-api: the network-under-test surface
//!
//! This crate defines what the harness can ask of, and send to, a running
//! beacon network. It holds no orchestration or evaluation logic.
//!
//! ## Key Components
//!
//! - `BeaconApi`: one beacon node endpoint (queries + submissions)
//! - `ValidatorSigner`: signs on behalf of validators
//! - `ChainSpec`: epoch/slot arithmetic and slashing penalties
//! - `DeterministicKeystore`: seed-derived Ed25519 validator keys
//! - `SimulatedNetwork`: in-memory network for tests and dry runs

pub mod api;
mod error;
pub mod fakes;
pub mod keys;
pub mod spec;
pub mod types;

pub use api::{BeaconApi, DeadlineApi, ValidatorSigner};
pub use error::{ApiError, ApiResult};
pub use fakes::{SimulatedEndpoint, SimulatedNetwork, SimulatedNetworkConfig};
pub use keys::DeterministicKeystore;
pub use spec::ChainSpec;
pub use types::{
    signing_root, Attestation, AttestationData, AttesterDuty, BeaconBlockHeader, ChainHead,
    Domain, DomainType, Epoch, Gwei, ProposerDuty, Root, SignedBlockProposal, Slot, Validator,
    ValidatorIndex, ValidatorPerformance,
};
