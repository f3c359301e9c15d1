// bookstore-core/src/index.rs
// Index definitions

use crate::error::{CatalogError, Result};
use crate::find_options::SortDirection;
use crate::query::{constrained_fields, equality_fields};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Name of the index every collection has on `_id`
pub const ID_INDEX_NAME: &str = "_id_";

/// Index definition: ordered key fields plus options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub keys: Vec<(String, SortDirection)>,
    pub unique: bool,
    /// Explicit name; defaults to the server's `field_dir` convention
    pub name: Option<String>,
}

impl IndexSpec {
    /// Ascending index over `fields`, in the given order
    pub fn ascending(fields: &[&str]) -> Self {
        IndexSpec {
            keys: fields
                .iter()
                .map(|f| (f.to_string(), SortDirection::Ascending))
                .collect(),
            unique: false,
            name: None,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Index name, `title_1` / `author_1_published_year_1` unless set explicitly
    pub fn name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        self.keys
            .iter()
            .map(|(field, dir)| format!("{}_{}", field, dir.as_i32()))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Key pattern as an ordered `{field: 1|-1}` document
    pub fn key_pattern(&self) -> Value {
        let map: Map<String, Value> = self
            .keys
            .iter()
            .map(|(field, dir)| (field.clone(), Value::from(dir.as_i32())))
            .collect();
        Value::Object(map)
    }

    fn validate(&self) -> Result<()> {
        if self.keys.is_empty() {
            return Err(CatalogError::invalid("index needs at least one key"));
        }
        for (i, (field, _)) in self.keys.iter().enumerate() {
            if field.is_empty() || field.starts_with('$') {
                return Err(CatalogError::invalid(format!(
                    "invalid index key field: '{}'",
                    field
                )));
            }
            if self.keys[..i].iter().any(|(f, _)| f == field) {
                return Err(CatalogError::invalid(format!(
                    "duplicate index key field: '{}'",
                    field
                )));
            }
        }
        Ok(())
    }

    /// Number of leading keys covered by equality predicates of `filter`
    fn equality_prefix(&self, eq_fields: &[String]) -> usize {
        self.keys
            .iter()
            .take_while(|(field, _)| eq_fields.contains(field))
            .count()
    }
}

/// Index definitions registered on one collection
///
/// Only definitions are kept: the in-memory store scans, and uses these to
/// report which index the server would pick.
#[derive(Debug, Clone)]
pub struct IndexCatalog {
    indexes: BTreeMap<String, IndexSpec>,
}

impl IndexCatalog {
    pub fn new() -> Self {
        let mut indexes = BTreeMap::new();
        indexes.insert(
            ID_INDEX_NAME.to_string(),
            IndexSpec::ascending(&["_id"]).unique().named(ID_INDEX_NAME),
        );
        IndexCatalog { indexes }
    }

    /// Register an index; re-registering an identical definition is a no-op
    pub fn create(&mut self, spec: &IndexSpec) -> Result<String> {
        spec.validate()?;
        let name = spec.name();

        if let Some(existing) = self.indexes.get(&name) {
            if existing.keys == spec.keys && existing.unique == spec.unique {
                return Ok(name);
            }
            return Err(CatalogError::store(format!(
                "An existing index has the same name as the requested index. \
                 Requested index: {}, existing index: {}",
                spec.key_pattern(),
                existing.key_pattern()
            )));
        }

        if let Some((other, _)) = self
            .indexes
            .iter()
            .find(|(_, existing)| existing.keys == spec.keys)
        {
            return Err(CatalogError::store(format!(
                "Index already exists with a different name: {}",
                other
            )));
        }

        self.indexes.insert(name.clone(), spec.clone());
        Ok(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.indexes.keys().cloned().collect()
    }

    pub fn unique_indexes(&self) -> impl Iterator<Item = &IndexSpec> {
        self.indexes
            .iter()
            .filter(|(name, spec)| spec.unique && name.as_str() != ID_INDEX_NAME)
            .map(|(_, spec)| spec)
    }

    /// Pick the index the server would use for `filter`
    ///
    /// Prefers the longest equality prefix; falls back to an index whose
    /// leading key carries a range predicate. `None` means a collection scan.
    pub fn select_for(&self, filter: &Value) -> Option<&IndexSpec> {
        let eq_fields = equality_fields(filter);
        let best_equality = self
            .indexes
            .values()
            .map(|spec| (spec.equality_prefix(&eq_fields), spec))
            .filter(|(prefix, _)| *prefix > 0)
            // longest prefix, then fewest keys, then name for determinism
            .max_by(|(pa, a), (pb, b)| {
                pa.cmp(pb)
                    .then_with(|| b.keys.len().cmp(&a.keys.len()))
                    .then_with(|| b.name().cmp(&a.name()))
            })
            .map(|(_, spec)| spec);
        if best_equality.is_some() {
            return best_equality;
        }

        let constrained = constrained_fields(filter);
        self.indexes.values().find(|spec| {
            spec.keys
                .first()
                .is_some_and(|(field, _)| constrained.contains(field))
        })
    }
}

impl Default for IndexCatalog {
    fn default() -> Self {
        Self::new()
    }
}
