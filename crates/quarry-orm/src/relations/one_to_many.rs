//! One-to-many resolution: the related model holds a back reference to the
//! parent's id.

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
    let related_model = require_related_model(RelationKind::OneToMany, field, model_id)?;
    let related_field = require_related_field(RelationKind::OneToMany, field, model_id)?;
    let nested = require_nested_fields(RelationKind::OneToMany, field, model_id)?;

    let ids = field_values(parent, "id");
    if ids.is_empty() {
        debug!(field = %field.field, "no parent ids to match, skipping");
        return Ok(());
    }

    let filter = and_filter(in_filter(related_field, ids), field.filter.as_ref());
    let request = QueryRequest {
        app_db: app_db.to_string(),
        model_id: related_model.to_string(),
        filter: Some(filter),
        fields: nested.to_vec(),
        sorter: field.sorter.clone(),
        pagination: field.pagination,
        distinct: false,
    };
    let related = execute_query(repo, &request, false).await?;

    merge(parent, &related, &field.field, related_field, related_model);
    Ok(())
}

pub(crate) fn require_related_field<'a>(
    kind: RelationKind,
    field: &'a FieldSpec,
    model_id: &str,
) -> Result<&'a str> {
    field.related_field.as_deref().ok_or_else(|| {
        crate::error::OrmError::Validation(format!(
            "{} field {} on model {model_id} must declare relatedField",
            kind.as_str(),
            field.field
        ))
    })
}

/// Distributes related rows onto the parent rows whose `id` equals the
/// related row's back-reference value. The nested result is created lazily on
/// the first match; the scan is O(parents x related) by design so the query
/// count stays at one.
pub(crate) fn merge(
    parent: &mut QueryResult,
    related: &QueryResult,
    field_name: &str,
    related_field: &str,
    related_model: &str,
) {
    for related_row in &related.list {
        let Some(key) = related_row.get(related_field) else {
            continue;
        };
        for row in &mut parent.list {
            if row.get("id") != Some(key) {
                continue;
            }
            let cell = row
                .entry(field_name.to_string())
                .or_insert_with(|| CellValue::Related(QueryResult::empty(related_model)));
            if let CellValue::Related(nested) = cell {
                nested.total += 1;
                nested.list.push(related_row.clone());
            }
        }
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
    fn merge_distributes_children_by_back_reference() {
        let mut parent = QueryResult::empty("parent");
        parent.list = vec![row(&[("id", json!("1"))]), row(&[("id", json!("2"))])];

        let mut related = QueryResult::empty("child");
        related.list = vec![
            row(&[("fk", json!("1")), ("v", json!("a"))]),
            row(&[("fk", json!("1")), ("v", json!("b"))]),
            row(&[("fk", json!("2")), ("v", json!("c"))]),
        ];

        merge(&mut parent, &related, "children", "fk", "child");

        let first = parent.list[0].get("children").unwrap().as_related().unwrap();
        assert_eq!(first.total, 2);
        assert_eq!(first.list.len(), 2);
        assert_eq!(first.model_id, "child");

        let second = parent.list[1].get("children").unwrap().as_related().unwrap();
        assert_eq!(second.total, 1);
        assert_eq!(
            second.list[0].get("v").unwrap().as_scalar().unwrap(),
            &json!("c")
        );
    }

    #[test]
    fn merge_leaves_unmatched_parents_untouched() {
        let mut parent = QueryResult::empty("parent");
        parent.list = vec![row(&[("id", json!("9"))])];

        let mut related = QueryResult::empty("child");
        related.list = vec![row(&[("fk", json!("1"))])];

        merge(&mut parent, &related, "children", "fk", "child");
        assert!(parent.list[0].get("children").is_none());
    }
}
