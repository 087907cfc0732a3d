//! Error types for query compilation.

use thiserror::Error;

use crate::binder::{AliasError, BindError};
use crate::compiler::{CastError, ValuesError};

/// Result type alias using [`CompileError`].
pub type Result<T> = std::result::Result<T, CompileError>;

/// Errors raised while compiling a query expression.
///
/// Every variant is fatal to the compile that produced it; the compiler
/// stops at the first one and never returns partial IR.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// Placeholder count in a fragment does not match its arguments.
    #[error(
        "Fragment arity error: `{fragment}` has {placeholders} placeholder(s) but {arguments} argument(s)"
    )]
    FragmentArity {
        fragment: String,
        placeholders: usize,
        arguments: usize,
    },

    /// A fragment argument wrapper received a value it cannot carry.
    #[error("Invalid fragment argument {index} in `{fragment}`: {reason}")]
    InvalidFragmentArgument {
        fragment: String,
        index: usize,
        reason: String,
    },

    /// Named binding, source or field resolution failed.
    #[error("Binding error: {0}")]
    Binding(#[from] BindError),

    /// Cast target could not be resolved.
    #[error("Cast error: {0}")]
    Cast(#[from] CastError),

    /// `selected_as` definition or reference is invalid.
    #[error("Alias error: {0}")]
    Alias(#[from] AliasError),

    /// Malformed values table.
    #[error("Values error: {0}")]
    Values(#[from] ValuesError),

    /// Interval unit outside the fixed vocabulary.
    #[error("Interval error: unknown unit `{unit}`")]
    Interval { unit: String },

    /// Structurally invalid expression.
    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    /// Name/arity pair missing from the surface call table.
    #[error("Unknown call: {name}/{arity}")]
    UnknownCall { name: String, arity: usize },

    /// Schema metadata registered with the catalog is malformed.
    #[error("Schema error: {0}")]
    SchemaError(String),
}

impl CompileError {
    /// Builds an [`CompileError::InvalidExpression`] from anything printable.
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        CompileError::InvalidExpression(message.into())
    }
}
