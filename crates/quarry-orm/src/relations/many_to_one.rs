//! Many-to-one resolution: the field itself is the foreign-key column on the
//! parent rows.
//!
//! One batched lookup fetches every referenced related row; each parent
//! row's foreign-key scalar is then replaced in place by a nested result
//! holding the row(s) whose `id` it references. Rows with a null or absent
//! key keep their scalar.

use tracing::debug;

use crate::error::Result;
use crate::executor::execute_query;
use crate::query::{CellValue, FieldSpec, QueryRequest, QueryResult, RelationKind};
use crate::relations::{
    and_filter, field_values, in_filter, require_nested_fields, require_related_model,
};
use crate::repo::Repository;

pub(crate) async fn resolve(
    repo: &dyn Repository,
    app_db: &str,
    model_id: &str,
    parent: &mut QueryResult,
    field: &FieldSpec,
) -> Result<()> {
    let related_model = require_related_model(RelationKind::ManyToOne, field, model_id)?;
    let nested = require_nested_fields(RelationKind::ManyToOne, field, model_id)?;

    let keys = field_values(parent, &field.field);
    if keys.is_empty() {
        debug!(field = %field.field, "no foreign keys to look up, skipping");
        return Ok(());
    }

    // The merge matches on the related id column, so it must be selected
    // even when the caller did not ask for it.
    let mut fields = nested.to_vec();
    if !fields.iter().any(|spec| spec.field == "id") {
        fields.push(FieldSpec::column("id"));
    }

    let filter = and_filter(in_filter("id", keys), field.filter.as_ref());
    let request = QueryRequest {
        app_db: app_db.to_string(),
        model_id: related_model.to_string(),
        filter: Some(filter),
        fields,
        sorter: field.sorter.clone(),
        pagination: field.pagination,
        distinct: false,
    };
    let related = execute_query(repo, &request, false).await?;

    merge(parent, &related, &field.field, related_model);
    Ok(())
}

/// Replaces each parent row's foreign-key scalar with the nested result of
/// the rows it references.
fn merge(parent: &mut QueryResult, related: &QueryResult, field_name: &str, related_model: &str) {
    for row in &mut parent.list {
        let key = match row.get(field_name).and_then(CellValue::as_scalar) {
            Some(value) if !value.is_null() => value.clone(),
            _ => continue,
        };

        let mut nested = QueryResult::empty(related_model);
        for related_row in &related.list {
            let id = related_row.get("id").and_then(CellValue::as_scalar);
            if id == Some(&key) {
                nested.total += 1;
                nested.list.push(related_row.clone());
            }
        }
        row.insert(field_name.to_string(), CellValue::Related(nested));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Row;
    use serde_json::json;

    fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), CellValue::Scalar(v.clone())))
            .collect()
    }

    #[test]
    fn merge_replaces_foreign_keys_with_nested_results() {
        let mut parent = QueryResult::empty("order");
        parent.list = vec![
            row(&[("id", json!("1")), ("customer_id", json!("c1"))]),
            row(&[("id", json!("2")), ("customer_id", json!("c2"))]),
            row(&[("id", json!("3")), ("customer_id", json!(null))]),
        ];

        let mut related = QueryResult::empty("customer");
        related.list = vec![
            row(&[("id", json!("c1")), ("name", json!("Ada"))]),
            row(&[("id", json!("c2")), ("name", json!("Grace"))]),
        ];

        merge(&mut parent, &related, "customer_id", "customer");

        let first = parent.list[0]
            .get("customer_id")
            .unwrap()
            .as_related()
            .unwrap();
        assert_eq!(first.total, 1);
        assert_eq!(
            first.list[0].get("name").unwrap().as_scalar().unwrap(),
            &json!("Ada")
        );

        // Null keys keep their scalar.
        assert_eq!(
            parent.list[2].get("customer_id").unwrap().as_scalar(),
            Some(&json!(null))
        );
    }

    #[test]
    fn merge_attaches_empty_results_for_dangling_keys() {
        let mut parent = QueryResult::empty("order");
        parent.list = vec![row(&[("id", json!("1")), ("customer_id", json!("gone"))])];
        let related = QueryResult::empty("customer");

        merge(&mut parent, &related, "customer_id", "customer");

        let nested = parent.list[0]
            .get("customer_id")
            .unwrap()
            .as_related()
            .unwrap();
        assert_eq!(nested.total, 0);
        assert!(nested.list.is_empty());
    }
}
