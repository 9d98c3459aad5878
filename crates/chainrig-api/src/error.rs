//! Error types for the beacon network API.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by a [`crate::BeaconApi`] call.
///
/// Transport failures and protocol rejections are kept apart: a rejection is
/// the network *answering* "no", which fault-injection evaluators rely on,
/// while a transport failure means the request may never have arrived.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request could not be delivered or the response was lost.
    #[error("transport error talking to {endpoint}: {reason}")]
    Transport { endpoint: String, reason: String },

    /// The request did not complete within its deadline.
    #[error("request to {endpoint} exceeded deadline of {deadline:?}")]
    DeadlineExceeded { endpoint: String, deadline: Duration },

    /// The network processed the request and refused it.
    #[error("rejected by {endpoint}: {reason}")]
    Rejected { endpoint: String, reason: String },

    /// The requested object does not exist (yet).
    #[error("not found: {what}")]
    NotFound { what: String },

    /// Signing a message failed.
    #[error("signing failed for validator {validator_index}: {reason}")]
    Signing { validator_index: u64, reason: String },
}

impl ApiError {
    /// True when retrying the same read-only request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::Transport { .. } | ApiError::DeadlineExceeded { .. }
        )
    }

    /// True when the network explicitly refused the request.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ApiError::Rejected { .. })
    }
}

/// Result type for beacon network API operations.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
