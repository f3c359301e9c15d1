// bookstore-core/src/find_options.rs
// Find query options: projection, sort, skip, limit

use crate::value_utils::{get_nested_value, set_nested_value, sort_order};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sort / index key direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// Wire form: 1 or -1
    pub fn as_i32(self) -> i32 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }

    /// Parse the wire form (1 / -1, integer or float)
    pub fn from_value(value: &Value) -> Option<Self> {
        match value.as_f64()? {
            v if v == 1.0 => Some(SortDirection::Ascending),
            v if v == -1.0 => Some(SortDirection::Descending),
            _ => None,
        }
    }

    pub fn from_ascending(ascending: bool) -> Self {
        if ascending {
            SortDirection::Ascending
        } else {
            SortDirection::Descending
        }
    }
}

/// Options for find queries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Projection: field → include (true) / exclude (false), in order
    /// `_id` may be excluded while other fields are included
    pub projection: Option<Vec<(String, bool)>>,

    /// Sort keys, most significant first
    pub sort: Vec<(String, SortDirection)>,

    /// Documents to skip (pagination)
    pub skip: Option<u64>,

    /// Maximum number of documents to return
    pub limit: Option<u64>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Include exactly `fields` and drop `_id`
    pub fn with_fields_only(mut self, fields: &[&str]) -> Self {
        let mut projection: Vec<(String, bool)> =
            fields.iter().map(|f| (f.to_string(), true)).collect();
        projection.push(("_id".to_string(), false));
        self.projection = Some(projection);
        self
    }

    pub fn with_sort(mut self, field: &str, direction: SortDirection) -> Self {
        self.sort.push((field.to_string(), direction));
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Projection as a `{field: 0|1}` document
    pub fn projection_document(&self) -> Option<Value> {
        self.projection.as_ref().map(|fields| {
            let map: Map<String, Value> = fields
                .iter()
                .map(|(field, include)| (field.clone(), Value::from(i32::from(*include))))
                .collect();
            Value::Object(map)
        })
    }

    /// Sort as an ordered `{field: 1|-1}` document
    pub fn sort_document(&self) -> Option<Value> {
        if self.sort.is_empty() {
            return None;
        }
        let map: Map<String, Value> = self
            .sort
            .iter()
            .map(|(field, dir)| (field.clone(), Value::from(dir.as_i32())))
            .collect();
        Some(Value::Object(map))
    }

    /// Apply sort, skip, limit and projection to scanned documents, in that order
    pub fn apply(&self, mut docs: Vec<Value>) -> Vec<Value> {
        apply_sort(&mut docs, &self.sort);
        let mut docs = apply_skip_limit(docs, self.skip, self.limit);
        if let Some(projection) = &self.projection {
            for doc in docs.iter_mut() {
                *doc = apply_projection(doc, projection);
            }
        }
        docs
    }
}

/// Apply a projection to a document
///
/// Include mode keeps only the listed fields (plus `_id` unless excluded);
/// exclude mode copies everything but the listed fields.
pub fn apply_projection(doc: &Value, projection: &[(String, bool)]) -> Value {
    let Value::Object(obj) = doc else {
        return doc.clone();
    };
    if projection.is_empty() {
        return doc.clone();
    }

    let include_mode = projection
        .iter()
        .any(|(field, include)| *include && field != "_id")
        || projection.iter().all(|(_, include)| *include);
    let id_excluded = projection
        .iter()
        .any(|(field, include)| field == "_id" && !include);

    if include_mode {
        let mut result = Value::Object(Map::new());
        if !id_excluded {
            if let Some(id) = obj.get("_id") {
                set_nested_value(&mut result, "_id", id.clone());
            }
        }
        for (field, include) in projection {
            if *include {
                if let Some(value) = get_nested_value(doc, field) {
                    set_nested_value(&mut result, field, value.clone());
                }
            }
        }
        result
    } else {
        let result: Map<String, Value> = obj
            .iter()
            .filter(|(key, _)| {
                !projection
                    .iter()
                    .any(|(field, include)| !include && field == *key)
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Value::Object(result)
    }
}

/// Stable multi-key sort
pub fn apply_sort(docs: &mut [Value], sort: &[(String, SortDirection)]) {
    if sort.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        for (field, direction) in sort {
            let cmp = sort_order(get_nested_value(a, field), get_nested_value(b, field));
            if cmp != std::cmp::Ordering::Equal {
                return match direction {
                    SortDirection::Ascending => cmp,
                    SortDirection::Descending => cmp.reverse(),
                };
            }
        }
        std::cmp::Ordering::Equal
    });
}

/// Skip then limit; a limit of 0 means no limit, as on the server
pub fn apply_skip_limit(docs: Vec<Value>, skip: Option<u64>, limit: Option<u64>) -> Vec<Value> {
    let skip = usize::try_from(skip.unwrap_or(0)).unwrap_or(usize::MAX);
    let iter = docs.into_iter().skip(skip);
    match limit {
        Some(n) if n > 0 => iter.take(usize::try_from(n).unwrap_or(usize::MAX)).collect(),
        _ => iter.collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_projection_fields_only_drops_id() {
        let doc = json!({"_id": 7, "title": "Emma", "author": "Jane Austen", "price": 7.5, "genre": "Romance"});
        let options = FindOptions::new().with_fields_only(&["title", "author", "price"]);
        let projection = options.projection.as_ref().unwrap();

        let result = apply_projection(&doc, projection);
        assert_eq!(result, json!({"title": "Emma", "author": "Jane Austen", "price": 7.5}));
    }

    #[test]
    fn test_projection_include_keeps_id_by_default() {
        let doc = json!({"_id": 7, "title": "Emma", "genre": "Romance"});
        let result = apply_projection(&doc, &[("title".to_string(), true)]);
        assert_eq!(result, json!({"_id": 7, "title": "Emma"}));
    }

    #[test]
    fn test_projection_exclude_mode() {
        let doc = json!({"_id": 7, "title": "Emma", "genre": "Romance"});
        let result = apply_projection(&doc, &[("genre".to_string(), false)]);
        assert_eq!(result, json!({"_id": 7, "title": "Emma"}));
    }

    #[test]
    fn test_sort_with_tiebreak() {
        let mut docs = vec![
            json!({"price": 10, "title": "B"}),
            json!({"price": 5, "title": "Z"}),
            json!({"price": 10, "title": "A"}),
        ];
        let sort = vec![
            ("price".to_string(), SortDirection::Descending),
            ("title".to_string(), SortDirection::Ascending),
        ];
        apply_sort(&mut docs, &sort);
        let titles: Vec<_> = docs.iter().map(|d| d["title"].as_str().unwrap()).collect();
        assert_eq!(titles, vec!["A", "B", "Z"]);
    }

    #[test]
    fn test_skip_limit() {
        let docs: Vec<Value> = (0..12).map(|i| json!({"n": i})).collect();
        let page = apply_skip_limit(docs.clone(), Some(10), Some(5));
        assert_eq!(page, vec![json!({"n": 10}), json!({"n": 11})]);
        assert!(apply_skip_limit(docs.clone(), Some(20), Some(5)).is_empty());
        assert_eq!(apply_skip_limit(docs, None, Some(0)).len(), 12);
    }

    #[test]
    fn test_sort_and_projection_documents() {
        let options = FindOptions::new()
            .with_sort("price", SortDirection::Descending)
            .with_sort("title", SortDirection::Ascending)
            .with_fields_only(&["title"]);
        assert_eq!(options.sort_document(), Some(json!({"price": -1, "title": 1})));
        assert_eq!(options.projection_document(), Some(json!({"title": 1, "_id": 0})));
        assert_eq!(FindOptions::new().sort_document(), None);
    }

    #[test]
    fn test_sort_direction_parsing() {
        assert_eq!(SortDirection::from_value(&json!(1)), Some(SortDirection::Ascending));
        assert_eq!(SortDirection::from_value(&json!(-1.0)), Some(SortDirection::Descending));
        assert_eq!(SortDirection::from_value(&json!(2)), None);
        assert_eq!(SortDirection::from_ascending(false), SortDirection::Descending);
    }
}
