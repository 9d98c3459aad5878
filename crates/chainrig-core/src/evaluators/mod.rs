//! Builtin evaluations and the name registry used by run configuration.
//!
//! Names take an optional `@N` epoch suffix:
//!
//! | name | policy | `@N` |
//! |---|---|---|
//! | `healthz` | every epoch | optional, runs after epoch N |
//! | `finalization_occurs` | after epoch 3 | optional, runs after epoch N |
//! | `validators_participating` | after epoch 1 | optional, runs after epoch N |
//! | `balance_history` | after epoch 0 | optional, runs after epoch N |
//! | `inject_double_vote` | on epoch N | required |
//! | `inject_double_block` | on epoch N | required |
//! | `validators_slashed` | after epoch N | required |
//! | `slashed_validators_lose_balance` | after epoch N | required |

pub mod consequences;
pub mod history;
pub mod liveness;
pub mod slashing;

use chainrig_api::Epoch;

pub use consequences::{SlashedValidatorsLoseBalance, ValidatorsSlashed};
pub use history::BalanceHistory;
pub use liveness::{FinalizationOccurs, Healthz, ValidatorsParticipating};
pub use slashing::{DoubleBlockInjection, DoubleVoteInjection};

use crate::error::{ConfigError, ConfigResult};
use crate::evaluation::evaluator::Evaluator;
use crate::evaluation::policy::{after_epoch, all_epochs, on_epoch, Policy};

/// Evaluators run when a configuration names none.
pub const DEFAULT_EVALUATORS: &[&str] = &[
    "healthz",
    "finalization_occurs",
    "validators_participating",
    "balance_history",
    "inject_double_vote@5",
    "inject_double_block@6",
    "validators_slashed@7",
    "slashed_validators_lose_balance@7",
];

/// Every base name the registry knows.
pub const KNOWN_EVALUATORS: &[&str] = &[
    "healthz",
    "finalization_occurs",
    "validators_participating",
    "balance_history",
    "inject_double_vote",
    "inject_double_block",
    "validators_slashed",
    "slashed_validators_lose_balance",
];

/// Build an evaluator from `name[@N]`.
pub fn by_name(spec: &str) -> ConfigResult<Evaluator> {
    let spec = spec.trim();
    let (base, epoch) = split_epoch(spec)?;
    let template = format!("{base}_{{epoch}}");

    let optional = |default: Policy| epoch.map_or(default, after_epoch);
    let required = || {
        epoch.ok_or_else(|| ConfigError::MissingEpoch {
            name: base.to_string(),
        })
    };

    let evaluator = match base {
        "healthz" => Evaluator::new(template, optional(all_epochs()), Healthz),
        "finalization_occurs" => Evaluator::new(
            template,
            optional(after_epoch(3)),
            FinalizationOccurs::default(),
        ),
        "validators_participating" => Evaluator::new(
            template,
            optional(after_epoch(1)),
            ValidatorsParticipating::default(),
        ),
        "balance_history" => Evaluator::new(template, optional(after_epoch(0)), BalanceHistory),
        "inject_double_vote" => Evaluator::new(
            template,
            on_epoch(required()?),
            DoubleVoteInjection::default(),
        ),
        "inject_double_block" => {
            Evaluator::new(template, on_epoch(required()?), DoubleBlockInjection)
        }
        "validators_slashed" => {
            Evaluator::new(template, after_epoch(required()?), ValidatorsSlashed)
        }
        "slashed_validators_lose_balance" => Evaluator::new(
            template,
            after_epoch(required()?),
            SlashedValidatorsLoseBalance,
        ),
        _ => {
            return Err(ConfigError::UnknownEvaluator {
                name: base.to_string(),
            })
        }
    };
    Ok(evaluator)
}

/// Build evaluators for every name, in order.
pub fn build_all<S: AsRef<str>>(names: &[S]) -> ConfigResult<Vec<Evaluator>> {
    names.iter().map(|n| by_name(n.as_ref())).collect()
}

fn split_epoch(spec: &str) -> ConfigResult<(&str, Option<Epoch>)> {
    match spec.split_once('@') {
        None => Ok((spec, None)),
        Some((base, raw)) => {
            let epoch = raw.parse::<Epoch>().map_err(|_| ConfigError::InvalidEpoch {
                name: base.to_string(),
                value: raw.to_string(),
            })?;
            Ok((base, Some(epoch)))
        }
    }
}
