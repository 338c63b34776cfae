use mender_handlers::HandlerError;
use thiserror::Error;

/// Errors raised by catalog administration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// An action with the same id is already registered.
    #[error("recovery action already exists: {0}")]
    DuplicateAction(String),

    /// No action is registered under the id.
    #[error("recovery action not found: {0}")]
    ActionNotFound(String),

    /// The action failed validation.
    #[error("invalid recovery action: {0}")]
    InvalidAction(String),
}

/// Errors that can occur while orchestrating recoveries.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A catalog operation failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// A collaborator (probe, monitor) failed.
    #[error("handler error: {0}")]
    Handler(#[from] HandlerError),

    /// The alert store has no alert with the id.
    #[error("alert not found: {0}")]
    AlertNotFound(String),

    /// A recovery is already running for the alert.
    #[error("recovery already in progress for alert: {0}")]
    RecoveryInProgress(String),

    /// Reading or writing the alert store failed.
    #[error("alert store error: {0}")]
    Store(String),

    /// The orchestrator was misconfigured (e.g. a playbook step without a handler).
    #[error("configuration error: {0}")]
    Configuration(String),
}
