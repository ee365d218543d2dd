//! Filter tree to SQL predicate compilation.
//!
//! The filter grammar follows the sequelize operator style: a filter is an
//! object whose keys are either logical combinators (`Op.and` / `Op.or` over
//! a list of sub-filters) or field names. A field operand is a scalar
//! (implicit match), `null` (IS NULL), a list (membership), or an operator
//! map such as `{"Op.gt": 5, "Op.lt": 9}`.
//!
//! Bare string operands deliberately compile to a substring `like` match
//! rather than equality; callers wanting equality use `Op.eq`.

use std::fmt;

use serde_json::Value;
use tracing::{debug, error};

use crate::error::{OrmError, Result};
use crate::query::Filter;

/// Logical combinator over a list of sub-filters.
pub const OP_AND: &str = "Op.and";
/// Logical combinator over a list of sub-filters.
pub const OP_OR: &str = "Op.or";
pub const OP_EQ: &str = "Op.eq";
pub const OP_NE: &str = "Op.ne";
pub const OP_IS: &str = "Op.is";
pub const OP_NOT: &str = "Op.not";
pub const OP_GT: &str = "Op.gt";
pub const OP_GTE: &str = "Op.gte";
pub const OP_LT: &str = "Op.lt";
pub const OP_LTE: &str = "Op.lte";
pub const OP_LIKE: &str = "Op.like";
pub const OP_IN: &str = "Op.in";
pub const OP_NOT_IN: &str = "Op.notIn";

/// Rewrites the field and operand of a membership test before compilation.
///
/// The default implementation turns a `many2many` filter field into a
/// correlated junction subquery and redirects a `one2many` virtual field to
/// the `id` column; see [`crate::query::convert::RelationInConvert`].
pub trait InListConvert {
    fn convert(&self, field: &str, value: &Value) -> Result<(String, Value)>;
}

/// SQL comparators reachable from the operator map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cmp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Is,
    IsNot,
    Like,
    In,
    NotIn,
}

impl fmt::Display for Cmp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Is => "is",
            Self::IsNot => "is not",
            Self::Like => "like",
            Self::In => "in",
            Self::NotIn => "not in",
        };
        f.write_str(text)
    }
}

/// Compiles a filter tree into a SQL predicate string.
pub struct FilterCompiler<'a> {
    in_convert: Option<&'a dyn InListConvert>,
}

impl Default for FilterCompiler<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> FilterCompiler<'a> {
    /// A compiler without membership conversion.
    #[must_use]
    pub fn new() -> Self {
        Self { in_convert: None }
    }

    /// A compiler whose membership tests pass through `converter` first.
    #[must_use]
    pub fn with_in_convert(converter: &'a dyn InListConvert) -> Self {
        Self {
            in_convert: Some(converter),
        }
    }

    /// Compiles `filter` into a predicate. `None` (and the empty filter)
    /// matches all rows. Sibling keys are AND-combined; iteration order
    /// cannot change the logical result.
    pub fn compile(&self, filter: Option<&Filter>) -> Result<String> {
        let Some(filter) = filter else {
            return Ok("1=1".to_string());
        };

        let mut clauses = Vec::with_capacity(filter.len());
        for (key, value) in filter {
            debug!(key = %key, "compiling filter entry");
            let clause = match key.as_str() {
                OP_OR => self.combinator("or", key, value)?,
                OP_AND => self.combinator("and", key, value)?,
                _ => self.field_entry(key, value)?,
            };
            clauses.push(format!("({clause})"));
        }

        if clauses.is_empty() {
            return Ok("1=1".to_string());
        }
        Ok(clauses.join(" and "))
    }

    /// Compiles an `Op.and` / `Op.or` branch list.
    fn combinator(&self, logic: &str, key: &str, value: &Value) -> Result<String> {
        let branches = value.as_array().filter(|branches| !branches.is_empty());
        let Some(branches) = branches else {
            error!(key, "combinator requires a non-empty branch list");
            return Err(OrmError::FilterFormat(format!(
                "{key} requires a non-empty branch list"
            )));
        };

        let mut clauses = Vec::with_capacity(branches.len());
        for branch in branches {
            let Some(branch) = branch.as_object() else {
                return Err(OrmError::FilterFormat(format!(
                    "{key} branch must be an object"
                )));
            };
            clauses.push(format!("({})", self.compile(Some(branch))?));
        }
        Ok(clauses.join(&format!(" {logic} ")))
    }

    /// Compiles one field entry; the operand's type picks the implicit
    /// operator.
    fn field_entry(&self, field: &str, value: &Value) -> Result<String> {
        match value {
            Value::String(text) => Ok(scalar_clause(Cmp::Like, field, text)),
            Value::Number(number) => Ok(scalar_clause(Cmp::Eq, field, &number.to_string())),
            Value::Null => Ok(null_clause(Cmp::Is, field)),
            Value::Array(items) => value_list_clause(Cmp::In, field, items),
            Value::Object(operators) => self.operator_map(field, operators),
            Value::Bool(_) => {
                error!(field, "boolean operand has no implicit operator");
                Err(OrmError::UnsupportedValue {
                    field: field.to_string(),
                    value_type: "boolean",
                })
            }
        }
    }

    /// Compiles an explicit operator map; entries are AND-combined.
    fn operator_map(&self, field: &str, operators: &Filter) -> Result<String> {
        let mut clauses = Vec::with_capacity(operators.len());
        for (operator, operand) in operators {
            let clause = match operator.as_str() {
                OP_EQ => comparator_clause(Cmp::Eq, field, operand),
                OP_NE => comparator_clause(Cmp::Ne, field, operand),
                OP_GT => comparator_clause(Cmp::Gt, field, operand),
                OP_GTE => comparator_clause(Cmp::Gte, field, operand),
                OP_LT => comparator_clause(Cmp::Lt, field, operand),
                OP_LTE => comparator_clause(Cmp::Lte, field, operand),
                OP_IS => comparator_clause(Cmp::Is, field, operand),
                OP_NOT => comparator_clause(Cmp::IsNot, field, operand),
                OP_LIKE => comparator_clause(Cmp::Like, field, operand),
                OP_IN => self.membership(Cmp::In, field, operand),
                OP_NOT_IN => self.membership(Cmp::NotIn, field, operand),
                OP_AND => self.field_combinator("and", field, operator, operand),
                OP_OR => self.field_combinator("or", field, operator, operand),
                _ => {
                    error!(field, operator = %operator, "unknown operator symbol");
                    Err(OrmError::UnsupportedOperator {
                        field: field.to_string(),
                        operator: operator.clone(),
                    })
                }
            }?;
            clauses.push(clause);
        }

        if clauses.is_empty() {
            return Err(OrmError::FilterFormat(format!(
                "empty operator map for field {field}"
            )));
        }
        Ok(clauses.join(" and "))
    }

    /// A field-scoped `Op.and` / `Op.or`: the field name re-applies to every
    /// sub-operand.
    fn field_combinator(
        &self,
        logic: &str,
        field: &str,
        key: &str,
        value: &Value,
    ) -> Result<String> {
        let branches = value.as_array().filter(|branches| !branches.is_empty());
        let Some(branches) = branches else {
            error!(field, key, "field combinator requires a non-empty list");
            return Err(OrmError::FilterFormat(format!(
                "{key} on field {field} requires a non-empty operand list"
            )));
        };

        let mut clauses = Vec::with_capacity(branches.len());
        for branch in branches {
            if !branch.is_object() {
                return Err(OrmError::FilterFormat(format!(
                    "{key} operand on field {field} must be an object"
                )));
            }
            clauses.push(format!("({})", self.field_entry(field, branch)?));
        }
        Ok(clauses.join(&format!(" {logic} ")))
    }

    /// Membership test, routed through the relation-aware converter when one
    /// is bound. A string operand after conversion is spliced raw: it is a
    /// subquery.
    fn membership(&self, cmp: Cmp, field: &str, value: &Value) -> Result<String> {
        let (field, value) = match self.in_convert {
            Some(converter) => converter.convert(field, value)?,
            None => (field.to_string(), value.clone()),
        };

        match &value {
            Value::String(subquery) => Ok(format!("{field} {cmp} ({subquery})")),
            Value::Array(items) => value_list_clause(cmp, &field, items),
            other => Err(OrmError::UnsupportedValue {
                field,
                value_type: value_type_name(other),
            }),
        }
    }
}

/// An explicit comparator applied to one operand.
fn comparator_clause(cmp: Cmp, field: &str, operand: &Value) -> Result<String> {
    match operand {
        Value::String(text) => Ok(scalar_clause(cmp, field, text)),
        Value::Number(number) => Ok(scalar_clause(cmp, field, &number.to_string())),
        Value::Null => Ok(null_clause(cmp, field)),
        Value::Array(items) => value_list_clause(cmp, field, items),
        other => {
            error!(field, %cmp, "unsupported operand type");
            Err(OrmError::UnsupportedValue {
                field: field.to_string(),
                value_type: value_type_name(other),
            })
        }
    }
}

/// Scalar operands are uniformly single-quoted; the dialect coerces numeric
/// comparisons. `like` wraps the operand for substring matching.
fn scalar_clause(cmp: Cmp, field: &str, raw: &str) -> String {
    let operand = if cmp == Cmp::Like {
        format!("%{raw}%")
    } else {
        raw.to_string()
    };
    format!("{field} {cmp} '{}'", escape(&operand))
}

fn null_clause(cmp: Cmp, field: &str) -> String {
    format!("{field} {cmp} null")
}

/// Builds an `in (...)` style operand list: strings quoted, numbers raw.
fn value_list_clause(cmp: Cmp, field: &str, items: &[Value]) -> Result<String> {
    if items.is_empty() {
        return Err(OrmError::FilterFormat(format!(
            "empty value list for field {field}"
        )));
    }

    let mut rendered = Vec::with_capacity(items.len());
    for item in items {
        rendered.push(render_list_item(field, item)?);
    }
    Ok(format!("{field} {cmp} ({})", rendered.join(",")))
}

pub(crate) fn render_list_item(field: &str, item: &Value) -> Result<String> {
    match item {
        Value::String(text) => Ok(format!("'{}'", escape(text))),
        Value::Number(number) => Ok(number.to_string()),
        other => {
            error!(field, "unsupported value list element");
            Err(OrmError::UnsupportedValue {
                field: field.to_string(),
                value_type: value_type_name(other),
            })
        }
    }
}

/// Doubles embedded single quotes. The only escaping this engine performs;
/// field names are trusted input.
pub(crate) fn escape(text: &str) -> String {
    text.replace('\'', "''")
}

pub(crate) fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
