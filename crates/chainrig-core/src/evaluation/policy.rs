//! Epoch policies: predicates deciding whether an evaluator is due.

use std::fmt;
use std::sync::Arc;

use chainrig_api::Epoch;

/// A named predicate over the current epoch.
#[derive(Clone)]
pub struct Policy {
    label: String,
    predicate: Arc<dyn Fn(Epoch) -> bool + Send + Sync>,
}

impl Policy {
    pub fn new(
        label: impl Into<String>,
        predicate: impl Fn(Epoch) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn applies(&self, epoch: Epoch) -> bool {
        (self.predicate)(epoch)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn and(self, other: Policy) -> Policy {
        let label = format!("({} and {})", self.label, other.label);
        Policy::new(label, move |e| self.applies(e) && other.applies(e))
    }

    pub fn or(self, other: Policy) -> Policy {
        let label = format!("({} or {})", self.label, other.label);
        Policy::new(label, move |e| self.applies(e) || other.applies(e))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Policy {
        let label = format!("not {}", self.label);
        Policy::new(label, move |e| !self.applies(e))
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Policy").field(&self.label).finish()
    }
}

/// True only when `epoch == n`.
pub fn on_epoch(n: Epoch) -> Policy {
    Policy::new(format!("on epoch {n}"), move |e| e == n)
}

/// True for every epoch strictly after `n`.
pub fn after_epoch(n: Epoch) -> Policy {
    Policy::new(format!("after epoch {n}"), move |e| e > n)
}

pub fn all_epochs() -> Policy {
    Policy::new("all epochs", |_| true)
}

/// True for `a <= epoch <= b`.
pub fn between_epochs(a: Epoch, b: Epoch) -> Policy {
    Policy::new(format!("epochs {a}..={b}"), move |e| (a..=b).contains(&e))
}
