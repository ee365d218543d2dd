//! Query request/result model and SQL statement compilation.
//!
//! A [`QueryRequest`] describes a declarative query (filter tree, field list,
//! sort spec, pagination) against a model. [`CompiledStatement::compile`]
//! turns it into the textual clauses of a count statement and a data
//! statement; the executor runs them and stitches relation sub-results into
//! the returned [`QueryResult`].

pub mod convert;
pub mod filter;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{OrmError, Result};
use crate::query::convert::RelationInConvert;
use crate::query::filter::FilterCompiler;

/// A filter tree: field names or combinator keys mapped to operands.
pub type Filter = serde_json::Map<String, Value>;

/// Reserved alias carrying the row count in count statements.
pub(crate) const COUNT_ALIAS: &str = "__count";

/// Rows returned without pagination are capped to avoid unbounded fetches.
const DEFAULT_ROW_CAP: i64 = 1000;

/// Classification of a field as a relation rather than a plain column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationKind {
    /// Foreign-key column pointing at one related row.
    #[serde(rename = "many2one")]
    ManyToOne,
    /// Virtual field; the related model holds a back reference to this one.
    #[serde(rename = "one2many")]
    OneToMany,
    /// Relation through a junction model.
    #[serde(rename = "many2many")]
    ManyToMany,
    /// Attachment reference resolved from the file store model.
    #[serde(rename = "file")]
    File,
}

impl RelationKind {
    /// Whether the field maps to a physical column of the model's table.
    #[must_use]
    pub fn is_column(self) -> bool {
        matches!(self, Self::ManyToOne)
    }

    /// Wire name, used in diagnostics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManyToOne => "many2one",
            Self::OneToMany => "one2many",
            Self::ManyToMany => "many2many",
            Self::File => "file",
        }
    }
}

/// An ordering entry. `values` compiles to a positional `FIELD(...)` ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sorter {
    pub field: String,
    pub order: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}

/// 1-based pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current: i64,
    pub page_size: i64,
}

/// A requested field: a plain column, an aggregate expression, or a relation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldSpec {
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_type: Option<RelationKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub association_model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sorter: Option<Vec<Sorter>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summarize: Option<String>,
}

impl FieldSpec {
    /// A plain column field.
    #[must_use]
    pub fn column(name: impl Into<String>) -> Self {
        Self {
            field: name.into(),
            ..Self::default()
        }
    }
}

/// A declarative query against one model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryRequest {
    pub app_db: String,
    pub model_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    pub fields: Vec<FieldSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sorter: Option<Vec<Sorter>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    pub distinct: bool,
}

/// A cell of a result row: a scalar column value, or the nested result of a
/// resolved relation field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Scalar(Value),
    Related(QueryResult),
}

impl CellValue {
    /// The scalar value, if this cell has not been resolved into a relation.
    #[must_use]
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Self::Scalar(value) => Some(value),
            Self::Related(_) => None,
        }
    }

    /// The nested result of a resolved relation field.
    #[must_use]
    pub fn as_related(&self) -> Option<&QueryResult> {
        match self {
            Self::Related(result) => Some(result),
            Self::Scalar(_) => None,
        }
    }
}

/// One result row. Relation fields gain [`CellValue::Related`] values as the
/// resolution engine merges sub-results in.
pub type Row = BTreeMap<String, CellValue>;

/// The result tree of one query invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub model_id: String,
    /// Total matching rows; -1 until computed.
    pub total: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summaries: Option<BTreeMap<String, Value>>,
    pub list: Vec<Row>,
}

impl QueryResult {
    /// An empty result for the given model.
    #[must_use]
    pub fn empty(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            total: 0,
            summaries: None,
            list: Vec::new(),
        }
    }
}

/// The compiled clauses of a single query. Derived, immutable, single-use.
#[derive(Debug, Clone)]
pub struct CompiledStatement {
    pub app_db: String,
    pub model_id: String,
    pub fields: String,
    pub predicate: String,
    pub limit: String,
    pub sorter: String,
    pub summarize: String,
    pub distinct: bool,
}

impl CompiledStatement {
    /// Compiles the request's clauses. The filter compiler is bound to the
    /// request's field list so that relation fields used inside the filter
    /// are rewritten (junction subquery / id redirection).
    pub fn compile(request: &QueryRequest) -> Result<Self> {
        let converter = RelationInConvert::new(&request.model_id, &request.fields);
        let compiler = FilterCompiler::with_in_convert(&converter);
        let predicate = compiler.compile(request.filter.as_ref())?;

        Ok(Self {
            app_db: request.app_db.clone(),
            model_id: request.model_id.clone(),
            fields: field_clause(&request.model_id, &request.fields)?,
            predicate,
            limit: limit_clause(request.pagination.as_ref()),
            sorter: sorter_clause(request.sorter.as_deref()),
            summarize: summarize_clause(&request.fields),
            distinct: request.distinct,
        })
    }

    /// The aggregate/count statement.
    #[must_use]
    pub fn count_sql(&self) -> String {
        format!(
            "select {}count(*) as {COUNT_ALIAS} from {}.{} where {}",
            self.summarize, self.app_db, self.model_id, self.predicate
        )
    }

    /// The data statement.
    #[must_use]
    pub fn data_sql(&self) -> String {
        let distinct = if self.distinct { "distinct " } else { "" };
        format!(
            "select {distinct}{} from {}.{} where {} order by {} limit {}",
            self.fields, self.app_db, self.model_id, self.predicate, self.sorter, self.limit
        )
    }
}

/// Builds the projection. Relation-kind fields other than `many2one` are
/// virtual and carry no physical column.
fn field_clause(model_id: &str, fields: &[FieldSpec]) -> Result<String> {
    let columns: Vec<&str> = fields
        .iter()
        .filter(|field| field.field_type.map_or(true, RelationKind::is_column))
        .map(|field| field.field.as_str())
        .collect();

    if columns.is_empty() {
        return Err(OrmError::Validation(format!(
            "query on model {model_id} selects no physical column"
        )));
    }
    Ok(columns.join(","))
}

/// Builds the aggregate clause: `<expr> as <field>,` per summarize field,
/// ready to prefix the count projection.
fn summarize_clause(fields: &[FieldSpec]) -> String {
    let mut clause = String::new();
    for field in fields {
        if let Some(expr) = field.summarize.as_deref() {
            if !expr.is_empty() {
                clause.push_str(expr);
                clause.push_str(" as ");
                clause.push_str(&field.field);
                clause.push(',');
            }
        }
    }
    clause
}

/// Builds the ordering clause, defaulting to `id asc`. A sorter with an
/// explicit value list compiles to a positional `FIELD(...)` ordering.
fn sorter_clause(sorters: Option<&[Sorter]>) -> String {
    let sorters = match sorters {
        Some(sorters) if !sorters.is_empty() => sorters,
        _ => return "id asc".to_string(),
    };

    let parts: Vec<String> = sorters
        .iter()
        .map(|sorter| match sorter.values.as_deref() {
            Some(values) if !values.is_empty() => format!(
                "FIELD({},'{}') {}",
                sorter.field,
                values.join("','"),
                sorter.order
            ),
            _ => format!("{} {}", sorter.field, sorter.order),
        })
        .collect();
    parts.join(",")
}

/// Builds the `limit <offset>,<count>` operand. Absent pagination falls back
/// to a fixed row cap; an out-of-range window selects zero rows rather than
/// erroring.
fn limit_clause(pagination: Option<&Pagination>) -> String {
    let Some(pagination) = pagination else {
        return format!("0,{DEFAULT_ROW_CAP}");
    };

    if pagination.page_size < 0 || pagination.current <= 0 {
        warn!(
            current = pagination.current,
            page_size = pagination.page_size,
            "pagination out of range, selecting zero rows"
        );
        return "0,0".to_string();
    }

    let offset = (pagination.current - 1) * pagination.page_size;
    format!("{offset},{}", pagination.page_size)
}
