//! The restricted filter DSL.
//!
//! A filter is `{field, op, value}`. The operator set is closed and
//! case-sensitive; anything else fails deserialization and surfaces as a
//! `VALIDATION_ERROR`. Exclusion-by-pattern is deliberately absent:
//! callers express it with positive `in` lists or an analyze step.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use alfred_domain::error::{Error, Result};
use alfred_domain::schema::TableSchema;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Operators
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not_in")]
    NotIn,
    #[serde(rename = "ilike")]
    Ilike,
    #[serde(rename = "is_null")]
    IsNull,
    #[serde(rename = "is_not_null")]
    IsNotNull,
    /// Array containment.
    #[serde(rename = "contains")]
    Contains,
    /// Semantic match; only on explicitly indexed fields.
    #[serde(rename = "similar")]
    Similar,
}

impl FilterOp {
    fn wants_array(self) -> bool {
        matches!(self, Self::In)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    #[serde(default)]
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Check a filter set against a table's declared schema.
pub fn validate(filters: &[Filter], schema: &TableSchema) -> Result<()> {
    for f in filters {
        if !schema.has_field(&f.field) {
            return Err(Error::validation(format!(
                "unknown field '{}' on table '{}'",
                f.field, schema.table
            )));
        }
        if f.op.wants_array() && !f.value.is_array() {
            return Err(Error::validation(format!(
                "operator '{:?}' on '{}' requires an array value",
                f.op, f.field
            )));
        }
        if f.op == FilterOp::NotIn && f.value.is_array() {
            return Err(Error::validation(format!(
                "operator 'not_in' on '{}' takes a single value, not a list",
                f.field
            )));
        }
        if f.op == FilterOp::Similar && !schema.is_indexed(&f.field) {
            return Err(Error::validation(format!(
                "field '{}' on table '{}' is not indexed for similar",
                f.field, schema.table
            )));
        }
    }
    Ok(())
}

/// Parse raw JSON filters from an interpreter tool call.
pub fn parse_filters(raw: &[Value]) -> Result<Vec<Filter>> {
    raw.iter()
        .map(|v| {
            serde_json::from_value::<Filter>(v.clone())
                .map_err(|e| Error::validation(format!("malformed filter: {e}")))
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Row matching
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Evaluate one filter against a row. Used by the in-memory store; a
/// relational backend compiles the same DSL to SQL instead.
pub fn matches(row: &serde_json::Map<String, Value>, f: &Filter) -> bool {
    let field = row.get(&f.field);
    match f.op {
        FilterOp::Eq => field == Some(&f.value),
        FilterOp::Ne => field != Some(&f.value),
        FilterOp::Gt => compare(field, &f.value).map(|o| o.is_gt()).unwrap_or(false),
        FilterOp::Lt => compare(field, &f.value).map(|o| o.is_lt()).unwrap_or(false),
        FilterOp::Gte => compare(field, &f.value).map(|o| o.is_ge()).unwrap_or(false),
        FilterOp::Lte => compare(field, &f.value).map(|o| o.is_le()).unwrap_or(false),
        FilterOp::In => f
            .value
            .as_array()
            .map(|arr| field.map(|v| arr.contains(v)).unwrap_or(false))
            .unwrap_or(false),
        // Single value only; exclusion of a set is expressed with a
        // positive `in` list instead.
        FilterOp::NotIn => field != Some(&f.value),
        FilterOp::Ilike => match (field.and_then(Value::as_str), f.value.as_str()) {
            (Some(text), Some(pattern)) => ilike(text, pattern),
            _ => false,
        },
        FilterOp::IsNull => field.map(Value::is_null).unwrap_or(true),
        FilterOp::IsNotNull => field.map(|v| !v.is_null()).unwrap_or(false),
        FilterOp::Contains => field
            .and_then(Value::as_array)
            .map(|arr| arr.contains(&f.value))
            .unwrap_or(false),
        // The in-memory store approximates semantic match with substring
        // match; a real backend delegates to its index.
        FilterOp::Similar => match (field.and_then(Value::as_str), f.value.as_str()) {
            (Some(text), Some(query)) => text.to_lowercase().contains(&query.to_lowercase()),
            _ => false,
        },
    }
}

fn compare(field: Option<&Value>, target: &Value) -> Option<std::cmp::Ordering> {
    match (field?, target) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Case-insensitive match with SQL `%` wildcards.
fn ilike(text: &str, pattern: &str) -> bool {
    let text = text.to_lowercase();
    let pattern = pattern.to_lowercase();
    let leading = pattern.starts_with('%');
    let trailing = pattern.ends_with('%');
    let needle = pattern.trim_matches('%');

    if needle.is_empty() {
        return true;
    }
    match (leading, trailing) {
        (true, true) => text.contains(needle),
        (true, false) => text.ends_with(needle),
        (false, true) => text.starts_with(needle),
        (false, false) => text == needle,
    }
}
