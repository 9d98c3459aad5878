//! Chain objects exchanged with the network under test.
//!
//! These are deliberately thin: the harness only needs enough structure to
//! query duties and validator state, and to fabricate the conflicting
//! messages used for slashing injection. Hash roots are SHA-256 over a fixed
//! little-endian field layout, not SSZ.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Slot number.
pub type Slot = u64;
/// Epoch number.
pub type Epoch = u64;
/// Index of a validator in the registry.
pub type ValidatorIndex = u64;
/// Balance unit (10^-9 ETH).
pub type Gwei = u64;

/// A 32-byte hash root.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Root(pub [u8; 32]);

impl Root {
    /// The all-zero root.
    pub const ZERO: Root = Root([0u8; 32]);

    /// SHA-256 of the given bytes.
    pub fn hash(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Root(hasher.finalize().into())
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short hex form (first 8 hex chars) for logs.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl std::fmt::Display for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Root(0x{})", self.short())
    }
}

/// Signing domain kinds used by the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainType {
    BeaconProposer,
    BeaconAttester,
}

impl DomainType {
    /// Four-byte domain type constant.
    pub fn bytes(&self) -> [u8; 4] {
        match self {
            DomainType::BeaconProposer => [0, 0, 0, 0],
            DomainType::BeaconAttester => [1, 0, 0, 0],
        }
    }
}

/// A signing domain: domain type mixed with fork and genesis data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain(pub Root);

/// Root that is actually signed: object root bound to a domain.
pub fn signing_root(object_root: &Root, domain: &Domain) -> Root {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(object_root.as_bytes());
    buf.extend_from_slice(domain.0.as_bytes());
    Root::hash(&buf)
}

/// Current head of the canonical chain as seen by one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    pub slot: Slot,
    pub block_root: Root,
    pub finalized_epoch: Epoch,
}

/// Validator registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub index: ValidatorIndex,
    pub pubkey: Vec<u8>,
    pub effective_balance: Gwei,
    pub balance: Gwei,
    pub slashed: bool,
}

/// A validator's attestation assignment for an epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttesterDuty {
    pub validator_index: ValidatorIndex,
    pub slot: Slot,
    pub committee_index: u64,
    /// Position of the validator inside its committee.
    pub committee_position: u64,
}

/// A validator's block proposal assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposerDuty {
    pub validator_index: ValidatorIndex,
    pub slot: Slot,
}

/// The vote content of an attestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationData {
    pub slot: Slot,
    pub committee_index: u64,
    pub beacon_block_root: Root,
    pub source_epoch: Epoch,
    pub target_epoch: Epoch,
    pub target_root: Root,
}

impl AttestationData {
    /// Hash root over the fixed field layout.
    pub fn hash_root(&self) -> Root {
        let mut buf = Vec::with_capacity(8 * 4 + 32 * 2);
        buf.extend_from_slice(&self.slot.to_le_bytes());
        buf.extend_from_slice(&self.committee_index.to_le_bytes());
        buf.extend_from_slice(self.beacon_block_root.as_bytes());
        buf.extend_from_slice(&self.source_epoch.to_le_bytes());
        buf.extend_from_slice(&self.target_epoch.to_le_bytes());
        buf.extend_from_slice(self.target_root.as_bytes());
        Root::hash(&buf)
    }
}

/// A single-validator signed attestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub validator_index: ValidatorIndex,
    pub data: AttestationData,
    pub signature: Vec<u8>,
}

/// Block header carried by a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconBlockHeader {
    pub slot: Slot,
    pub proposer_index: ValidatorIndex,
    pub parent_root: Root,
    pub state_root: Root,
    pub body_root: Root,
}

impl BeaconBlockHeader {
    /// Hash root over the fixed field layout.
    pub fn hash_root(&self) -> Root {
        let mut buf = Vec::with_capacity(8 * 2 + 32 * 3);
        buf.extend_from_slice(&self.slot.to_le_bytes());
        buf.extend_from_slice(&self.proposer_index.to_le_bytes());
        buf.extend_from_slice(self.parent_root.as_bytes());
        buf.extend_from_slice(self.state_root.as_bytes());
        buf.extend_from_slice(self.body_root.as_bytes());
        Root::hash(&buf)
    }
}

/// A signed block proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBlockProposal {
    pub header: BeaconBlockHeader,
    pub signature: Vec<u8>,
}

/// Per-validator balance movement over one epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorPerformance {
    pub epoch: Epoch,
    pub validator_index: ValidatorIndex,
    pub balance_before: Gwei,
    pub balance_after: Gwei,
    pub effective_balance: Gwei,
    pub participated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(block_root: Root) -> AttestationData {
        AttestationData {
            slot: 9,
            committee_index: 0,
            beacon_block_root: block_root,
            source_epoch: 0,
            target_epoch: 1,
            target_root: Root::hash(b"target"),
        }
    }

    #[test]
    fn test_attestation_root_changes_with_block_root() {
        let honest = data(Root::hash(b"canonical"));
        let evil = data(Root::hash(b"fabricated"));
        assert_ne!(honest.hash_root(), evil.hash_root());
        assert_eq!(honest.hash_root(), honest.clone().hash_root());
    }

    #[test]
    fn test_signing_root_depends_on_domain() {
        let root = Root::hash(b"object");
        let a = Domain(Root::hash(b"attester"));
        let b = Domain(Root::hash(b"proposer"));
        assert_ne!(signing_root(&root, &a), signing_root(&root, &b));
    }

    #[test]
    fn test_root_display_is_full_hex() {
        let root = Root([0xab; 32]);
        let shown = root.to_string();
        assert!(shown.starts_with("0xabab"));
        assert_eq!(shown.len(), 2 + 64);
        assert_eq!(root.short(), "abababab");
    }
}
