// bookstore-core/src/query.rs
//! Filter evaluation for the in-memory store
//!
//! Supports the MongoDB filter subset the catalog issues:
//!
//! ```text
//! { field: value }                         implicit $eq
//! { field: { $eq | $ne | $gt | $gte | $lt | $lte: value } }
//! { field: { $in | $nin: [values] } }
//! { field: { $exists: bool } }
//! { $and | $or: [filters] }
//! ```
//!
//! Array-valued fields match when any element matches, as on the server.

use crate::error::{CatalogError, Result};
use crate::value_utils::{compare_values, get_nested_value, values_equal};
use serde_json::Value;
use std::cmp::Ordering;

/// Field-level operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Exists,
}

impl FieldOperator {
    fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "$eq" => FieldOperator::Eq,
            "$ne" => FieldOperator::Ne,
            "$gt" => FieldOperator::Gt,
            "$gte" => FieldOperator::Gte,
            "$lt" => FieldOperator::Lt,
            "$lte" => FieldOperator::Lte,
            "$in" => FieldOperator::In,
            "$nin" => FieldOperator::Nin,
            "$exists" => FieldOperator::Exists,
            other => {
                return Err(CatalogError::store(format!("unknown operator: {}", other)));
            }
        })
    }

    fn matches(self, doc_value: Option<&Value>, operand: &Value) -> Result<bool> {
        match self {
            FieldOperator::Eq => Ok(equals_any(doc_value, operand)),
            FieldOperator::Ne => Ok(!equals_any(doc_value, operand)),
            FieldOperator::Gt => Ok(compare_any(doc_value, operand, |o| o == Ordering::Greater)),
            FieldOperator::Gte => Ok(compare_any(doc_value, operand, |o| o != Ordering::Less)),
            FieldOperator::Lt => Ok(compare_any(doc_value, operand, |o| o == Ordering::Less)),
            FieldOperator::Lte => Ok(compare_any(doc_value, operand, |o| o != Ordering::Greater)),
            FieldOperator::In => {
                let candidates = operand
                    .as_array()
                    .ok_or_else(|| CatalogError::store("$in needs an array"))?;
                Ok(candidates.iter().any(|c| equals_any(doc_value, c)))
            }
            FieldOperator::Nin => {
                let candidates = operand
                    .as_array()
                    .ok_or_else(|| CatalogError::store("$nin needs an array"))?;
                Ok(!candidates.iter().any(|c| equals_any(doc_value, c)))
            }
            FieldOperator::Exists => {
                let wanted = operand.as_bool().unwrap_or_else(|| !operand.is_null());
                Ok(doc_value.is_some() == wanted)
            }
        }
    }
}

/// Equality, with element matching for arrays and missing == null
fn equals_any(doc_value: Option<&Value>, operand: &Value) -> bool {
    match doc_value {
        None => operand.is_null(),
        Some(v) if values_equal(v, operand) => true,
        Some(Value::Array(items)) => items.iter().any(|item| values_equal(item, operand)),
        Some(_) => false,
    }
}

fn compare_any<F>(doc_value: Option<&Value>, operand: &Value, predicate: F) -> bool
where
    F: Fn(Ordering) -> bool,
{
    let hit = |v: &Value| compare_values(v, operand).is_some_and(&predicate);
    match doc_value {
        None => false,
        Some(v) if hit(v) => true,
        Some(Value::Array(items)) => items.iter().any(hit),
        Some(_) => false,
    }
}

fn is_operator_object(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| !obj.is_empty() && obj.keys().all(|k| k.starts_with('$')))
}

fn matches_condition(doc_value: Option<&Value>, condition: &Value) -> Result<bool> {
    if !is_operator_object(condition) {
        return Ok(equals_any(doc_value, condition));
    }
    for (name, operand) in condition.as_object().into_iter().flatten() {
        if !FieldOperator::from_name(name)?.matches(doc_value, operand)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sub_filters<'a>(name: &str, value: &'a Value) -> Result<&'a Vec<Value>> {
    match value.as_array() {
        Some(items) if !items.is_empty() => Ok(items),
        _ => Err(CatalogError::store(format!(
            "{} must be a nonempty array",
            name
        ))),
    }
}

/// Check whether `document` satisfies `filter`
///
/// An empty filter matches everything. Unknown operators are reported as
/// store errors, the same way the server rejects them.
pub fn matches_filter(document: &Value, filter: &Value) -> Result<bool> {
    let clauses = filter
        .as_object()
        .ok_or_else(|| CatalogError::store("filter must be an object"))?;

    for (key, value) in clauses {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for sub in sub_filters(key, value)? {
                    if !matches_filter(document, sub)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for sub in sub_filters(key, value)? {
                    if matches_filter(document, sub)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            op if op.starts_with('$') => {
                return Err(CatalogError::store(format!(
                    "unknown top level operator: {}",
                    op
                )));
            }
            field => matches_condition(get_nested_value(document, field), value)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Fields constrained by equality in a filter, in filter order
///
/// Used by the in-memory explain to decide whether an index prefix applies.
/// Equality inside `$and` clauses counts; anything under `$or` does not.
pub fn equality_fields(filter: &Value) -> Vec<String> {
    let mut fields = Vec::new();
    if let Some(clauses) = filter.as_object() {
        for (key, value) in clauses {
            if key == "$and" {
                for sub in value.as_array().into_iter().flatten() {
                    fields.extend(equality_fields(sub));
                }
            } else if !key.starts_with('$') {
                let is_equality = !is_operator_object(value)
                    || value.as_object().is_some_and(|o| o.contains_key("$eq"));
                if is_equality && !fields.contains(key) {
                    fields.push(key.clone());
                }
            }
        }
    }
    fields
}

/// Fields constrained by any predicate (equality or range)
pub fn constrained_fields(filter: &Value) -> Vec<String> {
    let mut fields = Vec::new();
    if let Some(clauses) = filter.as_object() {
        for (key, value) in clauses {
            if key == "$and" {
                for sub in value.as_array().into_iter().flatten() {
                    for field in constrained_fields(sub) {
                        if !fields.contains(&field) {
                            fields.push(field);
                        }
                    }
                }
            } else if !key.starts_with('$') && !fields.contains(key) {
                fields.push(key.clone());
            }
        }
    }
    fields
}
