//! Core error types.

use thiserror::Error;

/// Boxed error raised by an external command executor.
pub type ExecutionError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Query compilation and execution errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A sub-expression has no backend translation and no safe client-side
    /// fallback.
    #[error("untranslatable expression: {0}")]
    Untranslatable(String),

    /// No polymorphic type test matched a row.
    #[error("no polymorphic type of {entity} matches the row")]
    NoPolymorphicMatch { entity: String },

    /// The model has no entity of this name.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// The entity has no column or navigation of this name.
    #[error("unknown member {member} on {entity}")]
    UnknownMember { entity: String, member: String },

    /// Plan construction failed.
    #[error("compile error: {0}")]
    Compile(String),

    /// Inlining exceeded the configured nesting depth.
    #[error("expression nesting exceeds maximum depth of {0}")]
    DepthExceeded(usize),

    /// `First` or `Single` over an empty result.
    #[error("sequence contains no elements")]
    NoElements,

    /// `Single` over a result with more than one row.
    #[error("sequence contains more than one element")]
    MoreThanOneElement,

    /// The command executor failed. The original error is kept unchanged.
    #[error("execution error: {0}")]
    Execution(#[source] ExecutionError),

    /// Expression error.
    #[error("expression error: {0}")]
    Expr(#[from] quarry_expr::Error),

    /// A row value could not be converted to the expected type.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl Error {
    /// Shorthand for [`Error::Untranslatable`].
    pub fn untranslatable(message: impl Into<String>) -> Self {
        Error::Untranslatable(message.into())
    }

    /// The executor's original error, if this is an execution failure.
    pub fn execution_source(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Error::Execution(source) => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
