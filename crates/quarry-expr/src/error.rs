//! Expression error types.

use thiserror::Error;

/// Expression-level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// The tree is well-formed JSON but not a valid query expression.
    #[error("invalid expression: {0}")]
    InvalidExpression(String),
}

/// Result type for expression operations.
pub type Result<T> = std::result::Result<T, Error>;
