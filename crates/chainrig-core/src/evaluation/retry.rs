//! Bounded retry for read-only network calls.
//!
//! Only transient errors (transport, deadline) are retried. Submissions are
//! never wrapped in this helper.

use std::future::Future;
use std::time::Duration;

use chainrig_api::ApiResult;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{EvalError, EvalResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out.
pub async fn retry_read<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    what: &str,
    mut op: F,
) -> EvalResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    let mut backoff = policy.initial_backoff;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                warn!(what, attempt, error = %e, "transient error, retrying");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(EvalError::Cancelled),
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(policy.max_backoff);
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}
