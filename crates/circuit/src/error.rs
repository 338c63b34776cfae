use std::time::Duration;

use thiserror::Error;

/// Error returned by a circuit-guarded call.
///
/// `Open` means the operation never ran. `Timeout` and `Operation` mean it ran
/// and failed, and the failure was counted against the circuit.
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// The circuit rejected the call without invoking the operation.
    #[error("circuit '{circuit_id}' is open; retry after {retry_after:?}")]
    Open {
        circuit_id: String,
        /// Time left until a trial call will be admitted.
        retry_after: Duration,
    },

    /// The operation did not complete within the slow-call threshold.
    #[error("call through circuit '{circuit_id}' timed out after {after:?}")]
    Timeout { circuit_id: String, after: Duration },

    /// The operation itself failed.
    #[error(transparent)]
    Operation(E),
}

impl<E> CallError<E> {
    /// Returns `true` if the call was rejected by an open circuit.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// The operation's own error, if it got that far.
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }
}
