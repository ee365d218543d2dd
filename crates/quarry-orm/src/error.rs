//! Error types for the query engine.

use thiserror::Error;

/// Errors produced while compiling or executing a query.
#[derive(Debug, Error)]
pub enum OrmError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Malformed filter shape (empty combinator list, non-object branch).
    #[error("filter format error: {0}")]
    FilterFormat(String),

    /// Operator symbol the compiler does not know.
    #[error("unsupported operator {operator} on field {field}")]
    UnsupportedOperator { field: String, operator: String },

    /// Operand type an operator cannot consume.
    #[error("unsupported {value_type} value for field {field}")]
    UnsupportedValue {
        field: String,
        value_type: &'static str,
    },

    /// Missing or inconsistent relation metadata on a field.
    #[error("validation error: {0}")]
    Validation(String),

    /// The repository broke its contract (e.g. a count statement with no row).
    #[error("repository contract violation: {0}")]
    RepositoryContract(String),

    /// Filter re-serialization or re-parse failure during substitution.
    #[error("filter substitution error: {0}")]
    Substitution(#[from] serde_json::Error),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, OrmError>;
