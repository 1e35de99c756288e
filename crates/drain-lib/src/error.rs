//! Error types for drain runs

use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = DrainError> = std::result::Result<T, E>;

/// Errors that abort a drain run
///
/// Unmanaged containers are not errors; they are reported as
/// [`SkippedContainer`](crate::models::SkippedContainer) entries.
#[derive(Debug, Error)]
pub enum DrainError {
    /// Listing or inspecting containers failed, or nothing is running
    #[error("container discovery failed: {0}")]
    Discovery(String),

    /// An external command exited non-zero
    #[error("command `{command}` failed with {status}: {output}")]
    ActionFailed {
        command: String,
        status: String,
        output: String,
    },

    /// An external command ran past its deadline and was killed
    #[error("command `{command}` timed out (longer than {secs}s)", secs = .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    /// An external command could not be started
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The run was cancelled by the operator
    #[error("drain interrupted")]
    Interrupted,

    #[error("invalid drain policy: {0}")]
    InvalidPolicy(String),

    #[error("failed to parse runtime output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DrainError {
    /// Whether this error came from operator cancellation
    pub fn is_interrupted(&self) -> bool {
        matches!(self, DrainError::Interrupted)
    }
}
