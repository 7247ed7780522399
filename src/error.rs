//! Errors raised while building expressions.
//!
//! Every builder method validates eagerly, so these surface at the call that
//! introduced the problem rather than at compile or execution time.

use crate::types::DataType;

/// Errors that can occur while constructing expressions or resolving schemas.
#[derive(Debug, thiserror::Error)]
pub enum ExprError {
    #[error("type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: String,
        expected: String,
        found: String,
    },

    #[error("cannot cast {from} to {to}")]
    InvalidCast { from: DataType, to: DataType },

    #[error("case expression requires at least one `when` branch")]
    EmptyCase,

    #[error("duplicate column name `{0}`")]
    DuplicateColumn(String),

    #[error("column reference `{0}` is ambiguous")]
    AmbiguousColumn(String),

    #[error("column `{column}` not found (available: {available})")]
    UnknownColumn { column: String, available: String },

    #[error("column `{column}` does not belong to relation `{relation}`")]
    UnboundColumn { column: String, relation: String },

    #[error("invalid membership test: {0}")]
    InvalidMembership(String),

    #[error("shape mismatch in {context}: {message}")]
    ShapeMismatch { context: String, message: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid type `{input}`: {message}")]
    InvalidType { input: String, message: String },

    #[error("failed to hash expression: {0}")]
    Hash(#[from] serde_json::Error),
}

impl ExprError {
    pub(crate) fn mismatch(
        context: impl Into<String>,
        expected: impl std::fmt::Display,
        found: impl std::fmt::Display,
    ) -> Self {
        ExprError::TypeMismatch {
            context: context.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

pub type ExprResult<T> = Result<T, ExprError>;
