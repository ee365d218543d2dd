//! Many-to-many resolution as a double hop through the junction model.
//!
//! The junction is fetched one-to-many style (filtered by the parent ids),
//! requesting a synthetic `many2one` field for the far side that carries the
//! caller's nested fields, filter, sorter and pagination. The whole relation
//! therefore costs exactly two statements regardless of parent count.

use tracing::debug;

use crate::error::Result;
use crate::executor::execute_query;
use crate::query::{CellValue, FieldSpec, QueryRequest, QueryResult, RelationKind};
use crate::relations::{
    field_values, in_filter, junction_model_id, require_nested_fields, require_related_model,
};
use crate::repo::Repository;

pub(crate) async fn resolve(
    repo: &dyn Repository,
    app_db: &str,
    model_id: &str,
    parent: &mut QueryResult,
    field: &FieldSpec,
) -> Result<()> {
    let related_model = require_related_model(RelationKind::ManyToMany, field, model_id)?;
    require_nested_fields(RelationKind::ManyToMany, field, model_id)?;

    let ids = field_values(parent, "id");
    if ids.is_empty() {
        debug!(field = %field.field, "no parent ids to match, skipping");
        return Ok(());
    }

    // The field's own filter is not applied to the junction fetch; it rides
    // on the synthetic many2one hop below.
    let local_key = format!("{model_id}_id");
    let filter = in_filter(&local_key, ids);
    let junction = junction_model_id(model_id, related_model, field.association_model_id.as_deref());

    let request = QueryRequest {
        app_db: app_db.to_string(),
        model_id: junction,
        filter: Some(filter),
        fields: junction_fields(model_id, related_model, field),
        sorter: None,
        pagination: field.pagination,
        distinct: false,
    };
    let junction_result = execute_query(repo, &request, false).await?;

    merge(
        parent,
        &junction_result,
        &field.field,
        &local_key,
        &format!("{related_model}_id"),
        related_model,
    );
    Ok(())
}

/// The two synthetic junction fields: the local key column, and a `many2one`
/// hop into the far model carrying the caller's original sub-request.
fn junction_fields(model_id: &str, related_model: &str, field: &FieldSpec) -> Vec<FieldSpec> {
    vec![
        FieldSpec::column(format!("{model_id}_id")),
        FieldSpec {
            field: format!("{related_model}_id"),
            field_type: Some(RelationKind::ManyToOne),
            related_model_id: Some(related_model.to_string()),
            pagination: field.pagination,
            filter: field.filter.clone(),
            fields: field.fields.clone(),
            sorter: field.sorter.clone(),
            ..FieldSpec::default()
        },
    ]
}

/// Splices each junction row's resolved far-side result into the parent row
/// it links to, summing totals.
fn merge(
    parent: &mut QueryResult,
    junction: &QueryResult,
    field_name: &str,
    local_key: &str,
    related_key: &str,
    related_model: &str,
) {
    for junction_row in &junction.list {
        let Some(local) = junction_row.get(local_key) else {
            continue;
        };
        let Some(far) = junction_row.get(related_key).and_then(CellValue::as_related) else {
            continue;
        };
        for row in &mut parent.list {
            if row.get("id") != Some(local) {
                continue;
            }
            let cell = row
                .entry(field_name.to_string())
                .or_insert_with(|| CellValue::Related(QueryResult::empty(related_model)));
            if let CellValue::Related(nested) = cell {
                nested.total += far.total;
                if far.total > 0 {
                    nested.list.extend(far.list.iter().cloned());
                }
            }
        }
    }
}
