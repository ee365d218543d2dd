//! Default membership converter: relation fields used inside a filter.
//!
//! A `many2many` field is not a physical column, so a membership test on it
//! is rewritten into an `id` test against a correlated subquery over the
//! junction table. A `one2many` virtual field is likewise redirected to the
//! literal `id` column.

use serde_json::Value;
use tracing::error;

use crate::error::{OrmError, Result};
use crate::query::filter::{render_list_item, InListConvert};
use crate::query::{FieldSpec, RelationKind};
use crate::relations::junction_model_id;

/// Relation-aware [`InListConvert`] bound to one model's field list.
pub struct RelationInConvert<'a> {
    model_id: &'a str,
    fields: &'a [FieldSpec],
}

impl<'a> RelationInConvert<'a> {
    #[must_use]
    pub fn new(model_id: &'a str, fields: &'a [FieldSpec]) -> Self {
        Self { model_id, fields }
    }

    /// Builds the junction subquery replacing a `many2many` membership
    /// operand: `select <model>_id as id from <junction> where
    /// <related>_id in (<values>)`.
    fn junction_subquery(&self, spec: &FieldSpec, value: &Value) -> Result<String> {
        let Some(related_model) = spec.related_model_id.as_deref() else {
            error!(field = %spec.field, "many2many filter field has no relatedModelId");
            return Err(OrmError::Validation(format!(
                "many2many field {} has no relatedModelId",
                spec.field
            )));
        };

        let Some(items) = value.as_array() else {
            return Err(OrmError::UnsupportedValue {
                field: spec.field.clone(),
                value_type: crate::query::filter::value_type_name(value),
            });
        };
        let mut rendered = Vec::with_capacity(items.len());
        for item in items {
            rendered.push(render_list_item(&spec.field, item)?);
        }

        let junction =
            junction_model_id(self.model_id, related_model, spec.association_model_id.as_deref());
        Ok(format!(
            "select {}_id as id from {junction} where {related_model}_id in ({})",
            self.model_id,
            rendered.join(",")
        ))
    }
}

impl InListConvert for RelationInConvert<'_> {
    fn convert(&self, field: &str, value: &Value) -> Result<(String, Value)> {
        let spec = self
            .fields
            .iter()
            .find(|spec| spec.field == field && spec.field_type.is_some());

        match spec.and_then(|spec| spec.field_type.map(|kind| (spec, kind))) {
            Some((spec, RelationKind::ManyToMany)) => {
                let subquery = self.junction_subquery(spec, value)?;
                Ok(("id".to_string(), Value::String(subquery)))
            }
            // The virtual field holds no column; the membership test applies
            // to the local id values directly.
            Some((_, RelationKind::OneToMany)) => Ok(("id".to_string(), value.clone())),
            _ => Ok((field.to_string(), value.clone())),
        }
    }
}
