//! JSON value helpers shared by the in-memory filter, update and pipeline code
//!
//! Field paths use dot notation (`"address.city"`, `"items.0.name"`). Ordering
//! follows the document-store convention of ranking values by type bracket
//! first: missing/null < numbers < strings < objects < arrays < booleans.

use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Resolve a dotted field path inside a document
///
/// ```
/// use serde_json::json;
/// use bookstore_core::value_utils::get_nested_value;
///
/// let doc = json!({"publisher": {"city": "London"}});
/// assert_eq!(get_nested_value(&doc, "publisher.city"), Some(&json!("London")));
/// ```
pub fn get_nested_value<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    if !path.contains('.') {
        return doc.get(path);
    }

    let mut value = doc;
    for part in path.split('.') {
        value = match value {
            Value::Object(map) => map.get(part)?,
            Value::Array(arr) => arr.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}

/// Set a dotted field path, creating intermediate objects as needed
///
/// Returns `false` when the path runs through a non-object value.
pub fn set_nested_value(doc: &mut Value, path: &str, value: Value) -> bool {
    let mut parts = path.split('.').peekable();
    let mut current = doc;

    while let Some(part) = parts.next() {
        let map = match current {
            Value::Object(map) => map,
            _ => return false,
        };
        if parts.peek().is_none() {
            map.insert(part.to_string(), value);
            return true;
        }
        current = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    false
}

/// Remove a dotted field path; returns the removed value if there was one
pub fn remove_nested_value(doc: &mut Value, path: &str) -> Option<Value> {
    match path.rsplit_once('.') {
        None => doc.as_object_mut()?.remove(path),
        Some((parent, leaf)) => {
            let mut current = doc;
            for part in parent.split('.') {
                current = current.as_object_mut()?.get_mut(part)?;
            }
            current.as_object_mut()?.remove(leaf)
        }
    }
}

/// Equality with numeric cross-type semantics (`1 == 1.0`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n1), Value::Number(n2)) => match (n1.as_f64(), n2.as_f64()) {
            (Some(f1), Some(f2)) => f1 == f2,
            _ => n1 == n2,
        },
        (Value::Array(a1), Value::Array(a2)) => {
            a1.len() == a2.len() && a1.iter().zip(a2).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(o1), Value::Object(o2)) => {
            o1.len() == o2.len()
                && o1
                    .iter()
                    .all(|(k, v)| o2.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => a == b,
    }
}

/// Compare two values of the same type bracket
///
/// Returns `None` when the brackets differ, which makes range operators
/// (`$gt`, `$lt`, ...) fail to match instead of comparing across types.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(n1), Value::Number(n2)) => n1.as_f64()?.partial_cmp(&n2.as_f64()?),
        (Value::String(s1), Value::String(s2)) => Some(s1.cmp(s2)),
        (Value::Bool(b1), Value::Bool(b2)) => Some(b1.cmp(b2)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn type_bracket(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

/// Total order used by sort stages: type bracket first, then value
pub fn sort_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let bracket = type_bracket(a).cmp(&type_bracket(b));
    if bracket != Ordering::Equal {
        return bracket;
    }
    match (a, b) {
        (Some(Value::Array(a1)), Some(Value::Array(a2))) => a1
            .iter()
            .zip(a2)
            .map(|(x, y)| sort_order(Some(x), Some(y)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| a1.len().cmp(&a2.len())),
        (Some(Value::Object(_)), Some(Value::Object(_))) => {
            canonical_json_string(a.unwrap_or(&Value::Null))
                .cmp(&canonical_json_string(b.unwrap_or(&Value::Null)))
        }
        (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

/// Key-order independent string form of a value, used as a grouping key
///
/// ```
/// use serde_json::json;
/// use bookstore_core::value_utils::canonical_json_string;
///
/// assert_eq!(
///     canonical_json_string(&json!({"b": 2, "a": 1})),
///     canonical_json_string(&json!({"a": 1, "b": 2}))
/// );
/// ```
pub fn canonical_json_string(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(b.0));
            let inner = pairs
                .iter()
                .map(|(k, v)| format!("{:?}:{}", k, canonical_json_string(v)))
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{}}}", inner)
        }
        Value::Array(arr) => {
            let inner = arr
                .iter()
                .map(canonical_json_string)
                .collect::<Vec<_>>()
                .join(",");
            format!("[{}]", inner)
        }
        // 1 and 1.0 group together
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        _ => value.to_string(),
    }
}
