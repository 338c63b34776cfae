use std::time::Duration;

use mender_core::StepType;
use thiserror::Error;

/// Errors returned by step handlers and the other collaborators the
/// recovery engine calls out to.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// No handler is registered for the step type.
    #[error("no handler registered for step type: {0}")]
    NotFound(StepType),

    /// The handler ran and reported failure.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The handler did not finish in time.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// A network or process-level error occurred.
    #[error("connection error: {0}")]
    Connection(String),

    /// The collaborator was given invalid configuration or parameters.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl HandlerError {
    /// Returns `true` if the error is transient and the operation may succeed
    /// on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Connection(_))
    }
}
