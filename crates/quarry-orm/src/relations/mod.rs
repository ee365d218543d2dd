//! Relation resolution strategies.
//!
//! Each relation kind resolves with one batched secondary query (two for
//! `many2many`) derived from the parent rows' key values, then merges the
//! sub-result into the parent rows in place. Dispatch is a match over
//! [`RelationKind`]; strategies share the contract
//! `resolve(repo, parent, field)` and recurse through the executor, so
//! nested relation declarations resolve to arbitrary depth.

pub(crate) mod file;
pub(crate) mod many_to_many;
pub(crate) mod many_to_one;
pub(crate) mod one_to_many;

use serde_json::Value;

use crate::error::{OrmError, Result};
use crate::query::filter::{OP_AND, OP_IN};
use crate::query::{CellValue, FieldSpec, Filter, QueryResult, RelationKind};
use crate::repo::Repository;

/// Dispatches a relation field to its strategy.
pub(crate) async fn resolve_related(
    kind: RelationKind,
    repo: &dyn Repository,
    app_db: &str,
    model_id: &str,
    parent: &mut QueryResult,
    field: &FieldSpec,
) -> Result<()> {
    match kind {
        RelationKind::OneToMany => one_to_many::resolve(repo, app_db, model_id, parent, field).await,
        RelationKind::ManyToMany => {
            many_to_many::resolve(repo, app_db, model_id, parent, field).await
        }
        RelationKind::ManyToOne => many_to_one::resolve(repo, app_db, model_id, parent, field).await,
        RelationKind::File => file::resolve(repo, app_db, model_id, parent, field).await,
    }
}

/// The junction model backing a `many2many` relation: an explicit override,
/// else the two model ids joined by `_` in lexicographic order so both call
/// directions name the same table.
#[must_use]
pub fn junction_model_id(
    model_id: &str,
    related_model_id: &str,
    association_model_id: Option<&str>,
) -> String {
    if let Some(association) = association_model_id {
        return association.to_string();
    }
    if model_id >= related_model_id {
        format!("{related_model_id}_{model_id}")
    } else {
        format!("{model_id}_{related_model_id}")
    }
}

/// Collects the scalar values of `field` across the result's rows, skipping
/// rows without one. Numeric keys are normalized to their text form so they
/// can feed an `in (...)` list.
pub(crate) fn field_values(result: &QueryResult, field: &str) -> Vec<Value> {
    let mut values = Vec::new();
    for row in &result.list {
        match row.get(field).and_then(CellValue::as_scalar) {
            Some(Value::String(text)) => values.push(Value::String(text.clone())),
            Some(Value::Number(number)) => values.push(Value::String(number.to_string())),
            _ => {}
        }
    }
    values
}

/// Builds `{field: {"Op.in": values}}`.
pub(crate) fn in_filter(field: &str, values: Vec<Value>) -> Filter {
    let mut operator = Filter::new();
    operator.insert(OP_IN.to_string(), Value::Array(values));
    let mut clause = Filter::new();
    clause.insert(field.to_string(), Value::Object(operator));
    clause
}

/// AND-combines a derived key clause with a field's own filter, when present.
pub(crate) fn and_filter(clause: Filter, extra: Option<&Filter>) -> Filter {
    let Some(extra) = extra else {
        return clause;
    };
    let mut combined = Filter::new();
    combined.insert(
        OP_AND.to_string(),
        Value::Array(vec![Value::Object(clause), Value::Object(extra.clone())]),
    );
    combined
}

/// Fails with a validation error naming the field and model when a relation
/// field misses its related model id.
pub(crate) fn require_related_model<'a>(
    kind: RelationKind,
    field: &'a FieldSpec,
    model_id: &str,
) -> Result<&'a str> {
    field.related_model_id.as_deref().ok_or_else(|| {
        OrmError::Validation(format!(
            "{} field {} on model {model_id} must declare relatedModelId",
            kind.as_str(),
            field.field
        ))
    })
}

/// Fails when a relation field misses its non-empty nested field list.
pub(crate) fn require_nested_fields<'a>(
    kind: RelationKind,
    field: &'a FieldSpec,
    model_id: &str,
) -> Result<&'a [FieldSpec]> {
    match field.fields.as_deref() {
        Some(fields) if !fields.is_empty() => Ok(fields),
        _ => Err(OrmError::Validation(format!(
            "{} field {} on model {model_id} must declare nested fields",
            kind.as_str(),
            field.field
        ))),
    }
}
