//! Error Types
//!
//! The engine separates recoverable failures from fatal ones:
//!
//! - [`EvalError`] covers expression evaluation. It never leaves the
//!   evaluation boundary: safe evaluation logs it and yields `undefined`.
//! - [`Error`] covers structural and contract failures. These abort the
//!   current render pass and propagate up to the component boundary.
//!
//! Stale dependency entries are not errors at all; they are logged and
//! dropped by the scheduler.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors raised while rendering or driving a component.
#[derive(Debug, Error)]
pub enum Error {
    /// A malformed construct: missing sub-tags, spread of a non-object,
    /// an unresolvable tag.
    #[error("<{tag}>: {message}")]
    Structural { tag: String, message: String },

    /// A control-flow construct received input it cannot work with.
    #[error("contract violation: {0}")]
    Contract(String),

    /// The catalog has no template under this name.
    #[error("template `{0}` not found")]
    TemplateNotFound(String),

    /// The template exists but cannot be instantiated.
    #[error("invalid template `{name}`: {reason}")]
    InvalidTemplate { name: String, reason: String },

    /// Redeclaring a `const` variable in the same scope.
    #[error("`{0}` is a constant and cannot be reassigned")]
    ConstReassignment(String),

    /// A merge-patch path with characters outside `[a-zA-Z0-9_\-\[\].]`.
    #[error("invalid property path `{0}`")]
    InvalidPath(String),

    /// The owning component (or mesh host) has already been dropped.
    #[error("component `{0}` is no longer alive")]
    Detached(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Engine configuration could not be read.
    #[error("invalid engine configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn structural(tag: &str, message: impl Into<String>) -> Self {
        Self::Structural {
            tag: tag.to_string(),
            message: message.into(),
        }
    }
}

/// Expression syntax error with the byte offset where parsing stopped.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at offset {offset} in `{text}`")]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
    pub text: String,
}

/// Failure raised while evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("cannot read property `{property}` of {target}")]
    UndefinedAccess { property: String, target: &'static str },

    #[error("`{0}` is not defined")]
    UnknownIdentifier(String),

    #[error("`{0}` is not a function")]
    NotCallable(String),

    #[error("handler method `{0}` is not defined")]
    UnknownMethod(String),

    #[error("the component evaluating this expression is gone")]
    HostGone,

    #[error("invalid expression: {0}")]
    Invalid(String),

    #[error("{0}")]
    Thrown(String),
}
