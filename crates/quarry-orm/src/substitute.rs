//! Cross-query variable substitution.
//!
//! Filters may carry `%{dotted.path}` placeholders. Paths under `filterData.`
//! read from auxiliary query results resolved up front; any other path reads
//! from a flat, externally supplied global mapping. Because multiple rows can
//! sit at every level of a result tree, a path fans out and collects every
//! leaf value, joined with `","` so that a placeholder embedded in a JSON
//! array literal `["%{path}"]` re-parses as one element per value.
//!
//! Substitution is best effort: a placeholder that resolves to nothing is
//! left intact. Re-parsing the substituted text, however, must succeed.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::Result;
use crate::executor::execute_query;
use crate::query::filter::OP_IN;
use crate::query::{CellValue, FieldSpec, Filter, QueryRequest, QueryResult};
use crate::repo::Repository;

/// An auxiliary query whose result values later filters can reference.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterDataItem {
    pub model_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    pub fields: Vec<FieldSpec>,
}

/// Auxiliary results keyed by model id.
pub type FilterData = BTreeMap<String, QueryResult>;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"%\{([A-Za-z0-9_.]*)\}").expect("placeholder pattern"))
}

/// Resolves the auxiliary queries and rewrites `filter` in place.
pub async fn process_filter(
    filter: &mut Filter,
    filter_data: &[FilterDataItem],
    global_data: &serde_json::Map<String, Value>,
    app_db: &str,
    repo: &dyn Repository,
) -> Result<()> {
    let resolved = if filter_data.is_empty() {
        FilterData::new()
    } else {
        resolve_filter_data(filter_data, global_data, app_db, repo).await?
    };

    let (next, changed) = substitute(filter, &resolved, global_data)?;
    if changed {
        *filter = next;
    }
    Ok(())
}

/// Executes the auxiliary queries in declaration order. Each item's own
/// filter is substituted first against the results resolved so far plus the
/// global data, so an item may reference any item declared before it (a
/// single forward pass, not a dependency graph).
pub async fn resolve_filter_data(
    filter_data: &[FilterDataItem],
    global_data: &serde_json::Map<String, Value>,
    app_db: &str,
    repo: &dyn Repository,
) -> Result<FilterData> {
    let mut resolved = FilterData::new();
    for item in filter_data {
        let mut filter = item.filter.clone();
        if let Some(filter) = filter.as_mut() {
            let (next, changed) = substitute(filter, &resolved, global_data)?;
            if changed {
                *filter = next;
            }
        }

        let request = QueryRequest {
            app_db: app_db.to_string(),
            model_id: item.model_id.clone(),
            filter,
            fields: item.fields.clone(),
            sorter: None,
            pagination: None,
            distinct: true,
        };
        let result = execute_query(repo, &request, false).await?;
        resolved.insert(item.model_id.clone(), result);
    }
    Ok(resolved)
}

/// Substitutes every `%{path}` placeholder in `filter`, returning the
/// rewritten filter and whether the text actually changed. A parse failure
/// after substitution is fatal.
pub fn substitute(
    filter: &Filter,
    filter_data: &FilterData,
    global_data: &serde_json::Map<String, Value>,
) -> Result<(Filter, bool)> {
    let text = serde_json::to_string(filter)?;
    let mut next = text.clone();

    for captures in placeholder_pattern().captures_iter(&text) {
        let whole = &captures[0];
        let path = &captures[1];
        if let Some(replacement) = resolve_placeholder(path, filter_data, global_data) {
            debug!(path, replacement = %replacement, "substituting placeholder");
            next = next.replace(whole, &replacement);
        } else {
            debug!(path, "placeholder left unresolved");
        }
    }

    if next == text {
        return Ok((filter.clone(), false));
    }
    let parsed: Filter = serde_json::from_str(&next).map_err(|err| {
        error!(error = %err, "substituted filter does not parse");
        err
    })?;
    Ok((parsed, true))
}

fn resolve_placeholder(
    path: &str,
    filter_data: &FilterData,
    global_data: &serde_json::Map<String, Value>,
) -> Option<String> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.len() >= 2 && segments[0] == "filterData" {
        let result = filter_data.get(segments[1])?;
        let mut values = Vec::new();
        collect_result_values(result, &segments[2..], &mut values);
        return join_values(values);
    }

    let mut values = Vec::new();
    collect_global_values(global_data, &segments, &mut values);
    join_values(values)
}

/// Joined with `","` so the result slots into a JSON array literal; an empty
/// collection means the placeholder stays as-is.
fn join_values(values: Vec<String>) -> Option<String> {
    if values.is_empty() {
        None
    } else {
        Some(values.join("\",\""))
    }
}

/// Walks a result tree: every non-final segment descends through the rows'
/// nested relation results, the final segment reads a leaf column from every
/// row reached. Duplicates are kept.
fn collect_result_values(result: &QueryResult, segments: &[&str], values: &mut Vec<String>) {
    let Some((segment, rest)) = segments.split_first() else {
        return;
    };
    for row in &result.list {
        match row.get(*segment) {
            Some(CellValue::Scalar(value)) if rest.is_empty() => {
                if let Some(text) = leaf_text(value) {
                    values.push(text);
                }
            }
            Some(CellValue::Related(nested)) if !rest.is_empty() => {
                collect_result_values(nested, rest, values);
            }
            _ => {}
        }
    }
}

/// The global-data analogue: non-final segments expect a `{"list": [rows]}`
/// structure, the final segment reads string/integer leaves.
fn collect_global_values(
    data: &serde_json::Map<String, Value>,
    segments: &[&str],
    values: &mut Vec<String>,
) {
    let Some((segment, rest)) = segments.split_first() else {
        return;
    };
    let Some(node) = data.get(*segment) else {
        return;
    };

    if rest.is_empty() {
        if let Some(text) = leaf_text(node) {
            values.push(text);
        }
        return;
    }

    let rows = node
        .as_object()
        .and_then(|node| node.get("list"))
        .and_then(Value::as_array);
    let Some(rows) = rows else {
        return;
    };
    for row in rows {
        if let Some(row) = row.as_object() {
            collect_global_values(row, rest, values);
        }
    }
}

fn leaf_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) if number.is_i64() || number.is_u64() => Some(number.to_string()),
        _ => None,
    }
}

/// Rewrites bare array values of declared fields into explicit `Op.in`
/// operator maps.
pub fn replace_array_values(filter: &mut Filter, fields: &[FieldSpec]) {
    for (key, value) in filter.iter_mut() {
        if !value.is_array() {
            continue;
        }
        if fields.iter().any(|field| &field.field == key) {
            let mut operator = Filter::new();
            operator.insert(OP_IN.to_string(), value.take());
            *value = Value::Object(operator);
        }
    }
}

/// Deserializes a raw JSON array into auxiliary query items.
pub fn filter_data_from_value(value: &Value) -> Result<Vec<FilterDataItem>> {
    Ok(serde_json::from_value(value.clone())?)
}
