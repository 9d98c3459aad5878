use std::path::PathBuf;

use chainrig_core::RunnableError;
use thiserror::Error;

/// Errors produced while spawning and controlling component processes.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn {component} ({binary}): {source}")]
    Spawn {
        component: String,
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot open log file {}: {source}", .path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to send {signal} to {component}: {reason}")]
    Signal {
        component: String,
        signal: &'static str,
        reason: String,
    },

    #[error("no process spec configured for {role}")]
    MissingSpec { role: String },

    #[error("invalid process spec for {component}: {reason}")]
    InvalidSpec { component: String, reason: String },
}

pub type ProcessResult<T> = std::result::Result<T, ProcessError>;

impl From<ProcessError> for RunnableError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Spawn {
                component, source, ..
            } => RunnableError::StartFailed {
                component,
                reason: source.to_string(),
            },
            ProcessError::LogFile { path, source } => RunnableError::Io {
                component: path.display().to_string(),
                source,
            },
            ProcessError::Signal {
                component,
                signal,
                reason,
            } => RunnableError::Io {
                component,
                source: std::io::Error::other(format!("{signal}: {reason}")),
            },
            ProcessError::MissingSpec { role } => RunnableError::Misconfigured {
                component: role,
                reason: "no process spec configured".to_string(),
            },
            ProcessError::InvalidSpec { component, reason } => {
                RunnableError::Misconfigured { component, reason }
            }
        }
    }
}
