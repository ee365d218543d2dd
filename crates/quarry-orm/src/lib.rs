//! # quarry-orm
//!
//! A relational-query compiler and orchestrator: it accepts a declarative,
//! JSON-like filter and field description, compiles it into SQL statements,
//! and recursively resolves related entities (foreign-key, junction-table
//! and virtual one-to-many relations), merging sub-results back into the
//! parent rows with batched keys instead of per-row round trips.
//!
//! This crate provides:
//! - [`FilterCompiler`] - expression tree to SQL predicate, with
//!   field-type-aware value coercion and escaping
//! - [`execute_query`] / [`Orm`] - statement sequencing and recursive
//!   relation resolution over a [`Repository`]
//! - [`process_filter`] - cross-query `%{...}` placeholder substitution
//!   against auxiliary query results and global data
//!
//! ## Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use quarry_orm::{FieldSpec, Orm, Pagination, QueryRequest, RelationKind};
//! use serde_json::json;
//!
//! async fn example(orm: &Orm) -> quarry_orm::Result<()> {
//!     let request = QueryRequest {
//!         app_db: "appdb".into(),
//!         model_id: "core_user".into(),
//!         filter: json!({"id": "admin"}).as_object().cloned(),
//!         fields: vec![
//!             FieldSpec::column("id"),
//!             FieldSpec {
//!                 field: "roles".into(),
//!                 field_type: Some(RelationKind::ManyToMany),
//!                 related_model_id: Some("core_role".into()),
//!                 fields: Some(vec![FieldSpec::column("id")]),
//!                 ..FieldSpec::default()
//!             },
//!         ],
//!         pagination: Some(Pagination { current: 1, page_size: 10 }),
//!         ..QueryRequest::default()
//!     };
//!
//!     let result = orm.execute_query(&request).await?;
//!     println!("{} rows of {}", result.list.len(), result.total);
//!     Ok(())
//! }
//! ```
//!
//! ## Filters
//!
//! Filters follow the sequelize operator style. Bare string values compile
//! to a substring `like` match; explicit operators live under `Op.*` keys:
//!
//! ```ignore
//! use serde_json::json;
//!
//! let filter = json!({
//!     "name": "test",                              // name like '%test%'
//!     "age": {"Op.gt": 20, "Op.lt": 50},           // range
//!     "id": {"Op.in": ["2", "3"]},                 // membership
//!     "Op.or": [{"a": 5}, {"b": 6}],               // (a = '5') or (b = '6')
//! });
//! ```
//!
//! Filters may also carry `%{path}` placeholders filled from previously
//! executed auxiliary queries (`%{filterData.model.field}`) or from a global
//! key/value set; see [`process_filter`].

mod error;
mod executor;
mod orm;
pub mod query;
pub mod relations;
mod repo;
pub mod substitute;

pub use error::{OrmError, Result};
pub use executor::execute_query;
pub use orm::Orm;
pub use query::convert::RelationInConvert;
pub use query::filter::{FilterCompiler, InListConvert};
pub use query::{
    CellValue, CompiledStatement, FieldSpec, Filter, Pagination, QueryRequest, QueryResult,
    RelationKind, Row, Sorter,
};
pub use relations::junction_model_id;
pub use repo::{ExecOutcome, Repository};
pub use substitute::{
    filter_data_from_value, process_filter, replace_array_values, resolve_filter_data, substitute,
    FilterData, FilterDataItem,
};
