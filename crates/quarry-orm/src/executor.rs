//! Query orchestration: statement sequencing and relation dispatch.
//!
//! One invocation compiles the request, optionally runs the aggregate/count
//! statement, runs the data statement, then resolves every relation field in
//! declaration order. Relation strategies re-enter [`execute_query`] on the
//! related model, so the future is boxed to permit recursion.

use std::collections::BTreeMap;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{OrmError, Result};
use crate::query::{CellValue, CompiledStatement, QueryRequest, QueryResult, COUNT_ALIAS};
use crate::relations::resolve_related;
use crate::repo::Repository;

/// Executes a query request against the repository.
///
/// With `with_count`, the count statement runs first and its reserved
/// `__count` alias becomes the result total (remaining aggregate aliases are
/// exposed as summaries). The data statement is skipped when the count is
/// zero or the pagination window is zero-width. Any failure, at any
/// recursion depth, aborts the whole request.
pub fn execute_query<'a>(
    repo: &'a dyn Repository,
    request: &'a QueryRequest,
    with_count: bool,
) -> BoxFuture<'a, Result<QueryResult>> {
    Box::pin(async move {
        let statement = CompiledStatement::compile(request)?;
        let mut result = QueryResult {
            model_id: request.model_id.clone(),
            total: -1,
            summaries: None,
            list: Vec::new(),
        };

        if with_count {
            let sql = statement.count_sql();
            debug!(sql = %sql, "running count statement");
            let rows = repo.query(&sql).await?;
            let Some(first) = rows.into_iter().next() else {
                error!(sql = %sql, "count statement returned no rows");
                return Err(OrmError::RepositoryContract(format!(
                    "count statement returned no rows: {sql}"
                )));
            };

            let mut summaries: BTreeMap<String, Value> = first
                .into_iter()
                .filter_map(|(column, cell)| match cell {
                    CellValue::Scalar(value) => Some((column, value)),
                    CellValue::Related(_) => None,
                })
                .collect();
            let count = summaries.remove(COUNT_ALIAS).ok_or_else(|| {
                OrmError::RepositoryContract(format!("count statement row misses {COUNT_ALIAS}"))
            })?;
            result.total = count_value(&count)?;
            if !summaries.is_empty() {
                result.summaries = Some(summaries);
            }
        }

        let window_open = request
            .pagination
            .as_ref()
            .map_or(true, |pagination| pagination.page_size > 0);
        if result.total != 0 && window_open {
            let sql = statement.data_sql();
            debug!(sql = %sql, "running data statement");
            result.list = repo.query(&sql).await?;
            if result.total <= 0 {
                result.total = i64::try_from(result.list.len()).unwrap_or(i64::MAX);
            }

            for field in &request.fields {
                if let Some(kind) = field.field_type {
                    debug!(field = %field.field, kind = kind.as_str(), "resolving relation field");
                    resolve_related(
                        kind,
                        repo,
                        &request.app_db,
                        &request.model_id,
                        &mut result,
                        field,
                    )
                    .await
                    .map_err(|err| {
                        error!(
                            field = %field.field,
                            model = %request.model_id,
                            error = %err,
                            "relation resolution failed"
                        );
                        err
                    })?;
                }
            }
        }

        Ok(result)
    })
}

/// The count alias arrives as whatever the driver decodes; accept integer
/// and textual forms.
fn count_value(value: &Value) -> Result<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .ok_or_else(|| OrmError::RepositoryContract(format!("non-integer count: {number}"))),
        Value::String(text) => text
            .parse()
            .map_err(|_| OrmError::RepositoryContract(format!("non-integer count: {text}"))),
        other => Err(OrmError::RepositoryContract(format!(
            "non-integer count: {other}"
        ))),
    }
}
