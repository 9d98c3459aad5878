//! State shared by evaluator invocations within one run.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use chainrig_api::{Epoch, Root, ValidatorIndex, ValidatorPerformance};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tokio_util::sync::CancellationToken;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Validators a fault was deliberately injected for during this run.
///
/// Append-only. Injection evaluators write it; consequence evaluators read
/// it. Reads and appends are serialized by an internal mutex.
#[derive(Debug, Default)]
pub struct InjectedFaultLedger {
    indices: Mutex<BTreeSet<ValidatorIndex>>,
}

impl InjectedFaultLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `index`. Returns false if it was already present.
    pub fn try_record(&self, index: ValidatorIndex) -> bool {
        lock(&self.indices).insert(index)
    }

    pub fn contains(&self, index: ValidatorIndex) -> bool {
        lock(&self.indices).contains(&index)
    }

    /// Recorded indices, ascending.
    pub fn indices(&self) -> Vec<ValidatorIndex> {
        lock(&self.indices).iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.indices).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.indices).is_empty()
    }
}

#[derive(Debug, Default)]
struct BalanceHistory {
    rows: Vec<ValidatorPerformance>,
    next_epoch: Epoch,
}

/// Run-scoped context handed to every evaluation.
#[derive(Debug)]
pub struct EvaluationContext {
    seed: u64,
    ledger: InjectedFaultLedger,
    rng: Mutex<ChaCha8Rng>,
    history: Mutex<BalanceHistory>,
    injection: AsyncMutex<()>,
    cancel: CancellationToken,
}

impl EvaluationContext {
    pub fn new(seed: u64, cancel: CancellationToken) -> Self {
        Self {
            seed,
            ledger: InjectedFaultLedger::new(),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            history: Mutex::new(BalanceHistory::default()),
            injection: AsyncMutex::new(()),
            cancel,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn ledger(&self) -> &InjectedFaultLedger {
        &self.ledger
    }

    /// Serializes fault injections. Hold the guard from target selection
    /// through submission and recording so that concurrent injectors never
    /// pick the same validator.
    pub async fn begin_injection(&self) -> AsyncMutexGuard<'_, ()> {
        self.injection.lock().await
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A random root from the run's seeded stream.
    pub fn fabricated_root(&self) -> Root {
        let mut bytes = [0u8; 32];
        lock(&self.rng).fill_bytes(&mut bytes);
        Root(bytes)
    }

    /// Uniform in `0..bound` from the run's seeded stream.
    pub fn random_below(&self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        lock(&self.rng).gen_range(0..bound)
    }

    /// First epoch not yet present in the balance history.
    pub fn history_next_epoch(&self) -> Epoch {
        lock(&self.history).next_epoch
    }

    /// Append rows covering every epoch below `through`.
    pub fn record_balances(&self, rows: Vec<ValidatorPerformance>, through: Epoch) {
        let mut history = lock(&self.history);
        history.rows.extend(rows);
        history.next_epoch = history.next_epoch.max(through);
    }

    pub fn balance_history(&self) -> Vec<ValidatorPerformance> {
        lock(&self.history).rows.clone()
    }
}
