//! Chain constants the harness needs to reason about epochs and penalties.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{Epoch, Gwei, Slot};

/// Protocol constants for the network under test.
///
/// Defaults follow the minimal preset with Bellatrix slashing parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainSpec {
    pub slots_per_epoch: u64,
    pub slot_duration_ms: u64,
    pub max_effective_balance: Gwei,
    pub effective_balance_increment: Gwei,
    pub min_slashing_penalty_quotient: u64,
    pub fork_version: [u8; 4],
}

impl Default for ChainSpec {
    fn default() -> Self {
        Self {
            slots_per_epoch: 8,
            slot_duration_ms: 6_000,
            max_effective_balance: 32_000_000_000,
            effective_balance_increment: 1_000_000_000,
            min_slashing_penalty_quotient: 32,
            fork_version: [2, 0, 0, 1],
        }
    }
}

impl ChainSpec {
    /// Minimal preset with a custom slot duration (handy for fast simulations).
    pub fn with_slot_duration(mut self, slot_duration: Duration) -> Self {
        self.slot_duration_ms = slot_duration.as_millis() as u64;
        self
    }

    pub fn slot_duration(&self) -> Duration {
        Duration::from_millis(self.slot_duration_ms)
    }

    pub fn epoch_duration(&self) -> Duration {
        self.slot_duration() * self.slots_per_epoch as u32
    }

    /// Epoch containing `slot`.
    pub fn epoch_of(&self, slot: Slot) -> Epoch {
        slot / self.slots_per_epoch
    }

    /// First slot of `epoch`.
    pub fn start_slot(&self, epoch: Epoch) -> Slot {
        epoch * self.slots_per_epoch
    }

    /// Initial slashing penalty applied to a slashed validator.
    pub fn min_slashing_penalty(&self) -> Gwei {
        self.max_effective_balance / self.min_slashing_penalty_quotient
    }

    /// Effective balance a slashed validator must fall below.
    ///
    /// `max_effective_balance - max_effective_balance / quotient + increment / 10`
    pub fn slashed_balance_threshold(&self) -> Gwei {
        self.max_effective_balance - self.min_slashing_penalty()
            + self.effective_balance_increment / 10
    }
}
