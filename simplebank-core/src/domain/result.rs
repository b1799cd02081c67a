//! Result and error types for the core library

use thiserror::Error;

/// Core library error type
///
/// Store adapters classify their failures into `Constraint`, `Connectivity`,
/// `Conflict` and `NotFound`; the transfer engine surfaces them unchanged.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input, rejected before a transaction is opened
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The store rejected a statement (unknown account, check constraint)
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Transport or driver failure, including begin/commit/rollback
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Lock wait timed out or the store detected a serialization conflict
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    #[error("Operation cancelled")]
    Cancelled,

    /// The unit of work failed and so did the rollback
    #[error("tx err: {source}, rb err: {rollback}")]
    Rollback {
        source: Box<Error>,
        rollback: Box<Error>,
    },

    /// Any other store failure, e.g. a malformed statement or stored row
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a constraint error
    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::Constraint(msg.into())
    }

    /// Create a connectivity error
    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::Connectivity(msg.into())
    }

    /// Whether the caller may reasonably retry the whole operation.
    ///
    /// Only lock conflicts qualify. A composite rollback error is judged by
    /// the failure that started it.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Conflict(_) => true,
            Error::Rollback { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;
