//! Top-level facade binding a repository to the query engine.

use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::executor::execute_query;
use crate::query::{Filter, QueryRequest, QueryResult};
use crate::repo::Repository;
use crate::substitute::{process_filter, FilterDataItem};

/// The engine entry point: a repository plus the operations callers use.
#[derive(Clone)]
pub struct Orm {
    repo: Arc<dyn Repository>,
}

impl Orm {
    #[must_use]
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// The bound repository, for callers issuing their own statements.
    #[must_use]
    pub fn repository(&self) -> &dyn Repository {
        self.repo.as_ref()
    }

    /// Executes a query with row counting, resolving every relation field.
    pub async fn execute_query(&self, request: &QueryRequest) -> Result<QueryResult> {
        execute_query(self.repo.as_ref(), request, true).await
    }

    /// Executes a query without the leading count statement.
    pub async fn execute_query_without_count(
        &self,
        request: &QueryRequest,
    ) -> Result<QueryResult> {
        execute_query(self.repo.as_ref(), request, false).await
    }

    /// Resolves a filter's auxiliary queries and substitutes its
    /// placeholders in place.
    pub async fn process_filter(
        &self,
        filter: &mut Filter,
        filter_data: &[FilterDataItem],
        global_data: &serde_json::Map<String, Value>,
        app_db: &str,
    ) -> Result<()> {
        process_filter(filter, filter_data, global_data, app_db, self.repo.as_ref()).await
    }
}
