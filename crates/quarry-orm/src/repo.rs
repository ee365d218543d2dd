//! Repository collaborator contract.
//!
//! The engine produces textual SQL and delegates all physical execution to a
//! [`Repository`]. Implementations own connection pooling, cancellation and
//! retry policy; the engine propagates their errors unmodified.

use async_trait::async_trait;

use crate::error::Result;
use crate::query::Row;

/// Outcome of one statement executed inside a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOutcome {
    pub last_insert_id: u64,
    pub rows_affected: u64,
}

/// Executes statements against the physical database.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Runs a read statement, returning each row as an ordered
    /// field-to-value mapping. Binary columns are surfaced as text.
    async fn query(&self, sql: &str) -> Result<Vec<Row>>;

    /// Runs the statements inside a single transaction, committing only when
    /// every statement succeeds, and reports per-statement outcomes.
    async fn execute_in_transaction(&self, statements: &[String]) -> Result<Vec<ExecOutcome>>;
}
