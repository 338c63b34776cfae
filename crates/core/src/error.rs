use thiserror::Error;

/// Errors raised while building or parsing core domain values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A success-condition expression could not be parsed.
    #[error("invalid success condition '{expr}': {reason}")]
    InvalidCondition {
        /// The raw expression as written in the playbook.
        expr: String,
        /// Why the expression was rejected.
        reason: String,
    },

    /// A string did not name a known comparison operator.
    #[error("unknown comparison operator: {0}")]
    UnknownOperator(String),
}
