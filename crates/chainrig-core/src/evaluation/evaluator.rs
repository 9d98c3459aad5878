//! Evaluators: a named, policy-gated evaluation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chainrig_api::{BeaconApi, ChainSpec, DeadlineApi, Epoch, ValidatorSigner};

use crate::error::{EvalError, EvalResult};
use crate::evaluation::context::EvaluationContext;
use crate::evaluation::policy::Policy;
use crate::evaluation::retry::RetryPolicy;

/// Handles to the network under test, shared by all evaluations.
#[derive(Clone)]
pub struct NetworkHandles {
    endpoints: Vec<Arc<dyn BeaconApi>>,
    signer: Arc<dyn ValidatorSigner>,
    spec: ChainSpec,
    retry: RetryPolicy,
}

impl NetworkHandles {
    pub fn new(
        endpoints: Vec<Arc<dyn BeaconApi>>,
        signer: Arc<dyn ValidatorSigner>,
        spec: ChainSpec,
    ) -> Self {
        Self {
            endpoints,
            signer,
            spec,
            retry: RetryPolicy::default(),
        }
    }

    /// Bound every API call by `deadline`.
    pub fn with_request_deadline(mut self, deadline: Duration) -> Self {
        self.endpoints = self
            .endpoints
            .into_iter()
            .map(|api| Arc::new(DeadlineApi::new(api, deadline)) as Arc<dyn BeaconApi>)
            .collect();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn endpoints(&self) -> &[Arc<dyn BeaconApi>] {
        &self.endpoints
    }

    /// Endpoint 0. Injections submit here only.
    pub fn primary(&self) -> EvalResult<&Arc<dyn BeaconApi>> {
        self.endpoints
            .first()
            .ok_or_else(|| EvalError::Precondition("no beacon endpoints configured".to_string()))
    }

    pub fn signer(&self) -> &dyn ValidatorSigner {
        self.signer.as_ref()
    }

    pub fn spec(&self) -> &ChainSpec {
        &self.spec
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }
}

impl fmt::Debug for NetworkHandles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.endpoints.iter().map(|e| e.endpoint()).collect();
        f.debug_struct("NetworkHandles")
            .field("endpoints", &names)
            .field("spec", &self.spec)
            .finish()
    }
}

/// A property check or a deliberate fault injection.
///
/// Called at most once per due epoch. Must not assume that evaluators which
/// failed earlier ran to completion.
#[async_trait]
pub trait Evaluation: Send + Sync {
    async fn evaluate(
        &self,
        epoch: Epoch,
        ctx: &EvaluationContext,
        net: &NetworkHandles,
    ) -> EvalResult<()>;
}

/// An [`Evaluation`] with its name template and policy.
#[derive(Clone)]
pub struct Evaluator {
    name: String,
    policy: Policy,
    evaluation: Arc<dyn Evaluation>,
}

impl Evaluator {
    /// `name` may contain `{epoch}`, substituted when the evaluator runs.
    pub fn new(name: impl Into<String>, policy: Policy, evaluation: impl Evaluation + 'static) -> Self {
        Self {
            name: name.into(),
            policy,
            evaluation: Arc::new(evaluation),
        }
    }

    pub fn name_template(&self) -> &str {
        &self.name
    }

    pub fn name_at(&self, epoch: Epoch) -> String {
        self.name.replace("{epoch}", &epoch.to_string())
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn is_due(&self, epoch: Epoch) -> bool {
        self.policy.applies(epoch)
    }

    pub fn evaluation(&self) -> &dyn Evaluation {
        self.evaluation.as_ref()
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::policy::on_epoch;

    struct Noop;

    #[async_trait]
    impl Evaluation for Noop {
        async fn evaluate(
            &self,
            _epoch: Epoch,
            _ctx: &EvaluationContext,
            _net: &NetworkHandles,
        ) -> EvalResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_name_template_substitutes_epoch() {
        let ev = Evaluator::new("validators_slashed_{epoch}", on_epoch(8), Noop);
        assert_eq!(ev.name_at(8), "validators_slashed_8");
        assert!(ev.is_due(8));
        assert!(!ev.is_due(7));
        assert_eq!(Evaluator::new("healthz", on_epoch(0), Noop).name_at(3), "healthz");
    }
}
