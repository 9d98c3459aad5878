//! Deterministic validator keys.
//!
//! Each validator index gets an Ed25519 key derived from a master seed, so a
//! simulated network and the harness signing on its behalf agree on keys
//! without exchanging any material. Keys are:
//! - Deterministic: the same seed always yields the same keys
//! - Independent: a validator's key does not depend on the registry size

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::api::ValidatorSigner;
use crate::error::{ApiError, ApiResult};
use crate::types::ValidatorIndex;

/// Ed25519 keys for validators `0..count`, derived from `master_seed`.
pub struct DeterministicKeystore {
    master_seed: u64,
    keys: Vec<SigningKey>,
}

impl DeterministicKeystore {
    pub fn new(master_seed: u64, count: u64) -> Self {
        let keys = (0..count)
            .map(|index| derive_key(master_seed, index))
            .collect();
        Self { master_seed, keys }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Public key bytes for `index`, if in range.
    pub fn pubkey(&self, index: ValidatorIndex) -> Option<Vec<u8>> {
        self.keys
            .get(index as usize)
            .map(|k| k.verifying_key().to_bytes().to_vec())
    }

    pub fn verifying_key(&self, index: ValidatorIndex) -> Option<VerifyingKey> {
        self.keys.get(index as usize).map(|k| k.verifying_key())
    }

    /// Check `signature` over `message` against the key of `index`.
    pub fn verify(&self, index: ValidatorIndex, message: &[u8], signature: &[u8]) -> bool {
        let Some(key) = self.verifying_key(index) else {
            return false;
        };
        let Ok(sig) = Signature::from_slice(signature) else {
            return false;
        };
        key.verify(message, &sig).is_ok()
    }
}

impl std::fmt::Debug for DeterministicKeystore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeterministicKeystore")
            .field("master_seed", &self.master_seed)
            .field("len", &self.keys.len())
            .finish()
    }
}

impl ValidatorSigner for DeterministicKeystore {
    fn sign(&self, validator_index: ValidatorIndex, message: &[u8]) -> ApiResult<Vec<u8>> {
        let key = self
            .keys
            .get(validator_index as usize)
            .ok_or_else(|| ApiError::Signing {
                validator_index,
                reason: format!("no key (keystore holds {} validators)", self.keys.len()),
            })?;
        Ok(key.sign(message).to_bytes().to_vec())
    }
}

fn derive_key(master_seed: u64, index: ValidatorIndex) -> SigningKey {
    let seed = master_seed
        .wrapping_mul(0x9e3779b97f4a7c15)
        .wrapping_add(index.wrapping_mul(0x517cc1b727220a95));
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    SigningKey::generate(&mut rng)
}
