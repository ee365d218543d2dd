//! File attachment resolution.
//!
//! Attachments live in their own store model carrying an owner back
//! reference, so the lookup is mechanically a one-to-many fetch; the
//! attached rows are opaque payloads the engine does not interpret.

use tracing::debug;

use crate::error::Result;
use crate::executor::execute_query;
use crate::query::{FieldSpec, QueryRequest, QueryResult, RelationKind};
use crate::relations::one_to_many;
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
    let related_model = require_related_model(RelationKind::File, field, model_id)?;
    let related_field = one_to_many::require_related_field(RelationKind::File, field, model_id)?;
    let nested = require_nested_fields(RelationKind::File, field, model_id)?;

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
    let attachments = execute_query(repo, &request, false).await?;

    one_to_many::merge(parent, &attachments, &field.field, related_field, related_model);
    Ok(())
}
