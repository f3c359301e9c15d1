// storage/memory_storage.rs
//! In-memory document store for tests and demos
//!
//! Evaluates filters, updates and pipelines by scanning; index definitions are
//! recorded (and unique ones enforced) but no index structures are built.
//!
//! # Architecture
//!
//! ```text
//! MemoryStore (DocumentStore implementation)
//!      ↓
//! RwLock<MemoryState>
//!      ↓
//! BTreeMap<String, MemoryCollection> (name -> documents + index catalog)
//! ```

use crate::aggregation::Pipeline;
use crate::error::{CatalogError, Result};
use crate::explain::{COLLSCAN, FETCH, IXSCAN};
use crate::find_options::FindOptions;
use crate::index::{IndexCatalog, IndexSpec, ID_INDEX_NAME};
use crate::query::matches_filter;
use crate::storage::{DeleteResult, DocumentStore, InsertResult, UpdateResult};
use crate::value_utils::{canonical_json_string, get_nested_value, remove_nested_value, set_nested_value};
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Default)]
struct MemoryCollection {
    docs: Vec<Value>,
    indexes: IndexCatalog,
}

#[derive(Debug)]
struct MemoryState {
    collections: BTreeMap<String, MemoryCollection>,
    /// Next auto-assigned `_id`
    next_id: i64,
}

/// In-memory store backend (testing)
///
/// # Examples
///
/// ```
/// use bookstore_core::storage::{DocumentStore, MemoryStore};
/// use serde_json::json;
///
/// let store = MemoryStore::new("plp_bookstore");
/// store.insert_many("books", vec![json!({"title": "Emma"})]).unwrap();
/// assert_eq!(store.list_collections().unwrap(), vec!["books"]);
/// ```
#[derive(Debug)]
pub struct MemoryStore {
    database: String,
    state: RwLock<MemoryState>,
}

fn unique_key(doc: &Value, spec: &IndexSpec) -> String {
    let parts: Vec<String> = spec
        .keys
        .iter()
        .map(|(field, _)| canonical_json_string(get_nested_value(doc, field).unwrap_or(&Value::Null)))
        .collect();
    parts.join("|")
}

impl MemoryCollection {
    /// Reject `candidate` if it collides with another document on `_id` or a unique index
    fn check_unique(&self, ns: &str, candidate: &Value, skip: Option<usize>) -> Result<()> {
        let id_spec = IndexSpec::ascending(&["_id"]).named(ID_INDEX_NAME);
        let specs = std::iter::once(&id_spec).chain(self.indexes.unique_indexes());
        for spec in specs {
            let key = unique_key(candidate, spec);
            let clash = self
                .docs
                .iter()
                .enumerate()
                .any(|(i, doc)| Some(i) != skip && unique_key(doc, spec) == key);
            if clash {
                return Err(CatalogError::store(format!(
                    "E11000 duplicate key error collection: {} index: {} dup key: {}",
                    ns,
                    spec.name(),
                    key
                )));
            }
        }
        Ok(())
    }

    fn first_match(&self, filter: &Value) -> Result<Option<usize>> {
        for (i, doc) in self.docs.iter().enumerate() {
            if matches_filter(doc, filter)? {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    fn count_matches(&self, filter: &Value) -> Result<u64> {
        let mut n = 0;
        for doc in &self.docs {
            if matches_filter(doc, filter)? {
                n += 1;
            }
        }
        Ok(n)
    }
}

/// Integral numeric `_id` (`2` or `2.0`), which could collide with an auto id
fn explicit_integer_id(id: &Value) -> Option<i64> {
    if let Some(i) = id.as_i64() {
        return Some(i);
    }
    id.as_f64()
        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
        .map(|f| f as i64)
}

/// Apply `$set` / `$unset` to a copy of `doc`
fn apply_update(doc: &Value, update: &Value) -> Result<Value> {
    let ops = update
        .as_object()
        .filter(|o| !o.is_empty())
        .ok_or_else(|| CatalogError::store("Update document must be a nonempty object"))?;

    let mut updated = doc.clone();
    for (op, fields) in ops {
        let fields = fields.as_object().ok_or_else(|| {
            CatalogError::store(format!("Modifiers operate on fields but {} was not an object", op))
        })?;
        for (path, value) in fields {
            if path == "_id" || path.starts_with("_id.") {
                return Err(CatalogError::store(
                    "Performing an update on the path '_id' would modify the immutable field '_id'",
                ));
            }
            match op.as_str() {
                "$set" => {
                    if !set_nested_value(&mut updated, path, value.clone()) {
                        return Err(CatalogError::store(format!(
                            "Cannot create field in element for path '{}'",
                            path
                        )));
                    }
                }
                "$unset" => {
                    remove_nested_value(&mut updated, path);
                }
                other if other.starts_with('$') => {
                    return Err(CatalogError::store(format!(
                        "Unknown modifier: {}",
                        other
                    )));
                }
                _ => {
                    return Err(CatalogError::store(
                        "update document requires atomic operators",
                    ));
                }
            }
        }
    }
    Ok(updated)
}

impl MemoryStore {
    /// Create an empty store; `database` is only used in namespaces
    pub fn new(database: &str) -> Self {
        MemoryStore {
            database: database.to_string(),
            state: RwLock::new(MemoryState {
                collections: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Number of documents currently in `collection`
    pub fn count(&self, collection: &str) -> usize {
        self.state
            .read()
            .collections
            .get(collection)
            .map_or(0, |c| c.docs.len())
    }

    fn explain_plan(&self, coll: Option<&MemoryCollection>, ns: &str, filter: &Value) -> Result<Value> {
        let started = Instant::now();
        let returned = match coll {
            Some(c) => c.count_matches(filter)?,
            None => 0,
        };
        let total = coll.map_or(0, |c| c.docs.len() as u64);
        let index = coll.and_then(|c| c.indexes.select_for(filter));

        let (winning_plan, keys_examined, docs_examined) = match (coll, index) {
            (Some(c), Some(spec)) => {
                // Documents reachable through the index bounds
                let bounded: Map<String, Value> = filter
                    .as_object()
                    .into_iter()
                    .flatten()
                    .filter(|(k, _)| spec.keys.iter().any(|(f, _)| f == *k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let examined = if bounded.is_empty() {
                    returned
                } else {
                    c.count_matches(&Value::Object(bounded))?
                };
                let plan = json!({
                    "stage": FETCH,
                    "inputStage": {
                        "stage": IXSCAN,
                        "keyPattern": spec.key_pattern(),
                        "indexName": spec.name(),
                        "isMultiKey": false,
                        "isUnique": spec.unique,
                        "direction": "forward"
                    }
                });
                (plan, examined, examined)
            }
            _ => (json!({"stage": COLLSCAN, "filter": filter, "direction": "forward"}), 0, total),
        };

        Ok(json!({
            "queryPlanner": {
                "namespace": ns,
                "parsedQuery": filter,
                "indexFilterSet": false,
                "winningPlan": winning_plan,
                "rejectedPlans": []
            },
            "executionStats": {
                "executionSuccess": true,
                "nReturned": returned,
                "executionTimeMillis": started.elapsed().as_millis() as u64,
                "totalKeysExamined": keys_examined,
                "totalDocsExamined": docs_examined
            },
            "ok": 1.0
        }))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new("test")
    }
}

impl DocumentStore for MemoryStore {
    // ========================================================================
    // COLLECTION MANAGEMENT
    // ========================================================================

    fn create_collection(&self, name: &str) -> Result<()> {
        if name.is_empty() || name.contains('$') {
            return Err(CatalogError::store(format!("Invalid collection name: '{}'", name)));
        }
        self.state
            .write()
            .collections
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self.state.read().collections.keys().cloned().collect())
    }

    // ========================================================================
    // DOCUMENT OPERATIONS
    // ========================================================================

    fn insert_many(&self, collection: &str, docs: Vec<Value>) -> Result<InsertResult> {
        let ns = self.namespace(collection);
        let mut state = self.state.write();
        let MemoryState { collections, next_id } = &mut *state;
        let coll = collections.entry(collection.to_string()).or_default();

        let mut inserted = 0;
        for doc in docs {
            let Value::Object(mut map) = doc else {
                return Err(CatalogError::store("document to insert must be an object"));
            };
            let explicit = map.get("_id").map(explicit_integer_id);
            match explicit {
                // Keep auto ids clear of caller-supplied integer ids
                Some(Some(id)) => *next_id = (*next_id).max(id.saturating_add(1)),
                Some(None) => {}
                None => {
                    map.insert("_id".to_string(), Value::from(*next_id));
                    *next_id += 1;
                }
            }
            let doc = Value::Object(map);
            // Ordered insert: documents before a failure stay inserted
            coll.check_unique(&ns, &doc, None)?;
            coll.docs.push(doc);
            inserted += 1;
        }
        debug!("inserted {} documents into {}", inserted, ns);
        Ok(InsertResult { inserted_count: inserted })
    }

    fn find(&self, collection: &str, filter: &Value, options: &FindOptions) -> Result<Vec<Value>> {
        let state = self.state.read();
        let Some(coll) = state.collections.get(collection) else {
            matches_filter(&Value::Object(Map::new()), filter)?;
            return Ok(Vec::new());
        };
        let mut hits = Vec::new();
        for doc in &coll.docs {
            if matches_filter(doc, filter)? {
                hits.push(doc.clone());
            }
        }
        Ok(options.apply(hits))
    }

    fn update_one(&self, collection: &str, filter: &Value, update: &Value) -> Result<UpdateResult> {
        let ns = self.namespace(collection);
        let mut state = self.state.write();
        let Some(coll) = state.collections.get_mut(collection) else {
            return Ok(UpdateResult::default());
        };
        let Some(pos) = coll.first_match(filter)? else {
            return Ok(UpdateResult::default());
        };

        let updated = apply_update(&coll.docs[pos], update)?;
        if updated == coll.docs[pos] {
            return Ok(UpdateResult { matched_count: 1, modified_count: 0 });
        }
        coll.check_unique(&ns, &updated, Some(pos))?;
        coll.docs[pos] = updated;
        Ok(UpdateResult { matched_count: 1, modified_count: 1 })
    }

    fn delete_one(&self, collection: &str, filter: &Value) -> Result<DeleteResult> {
        let mut state = self.state.write();
        let Some(coll) = state.collections.get_mut(collection) else {
            return Ok(DeleteResult::default());
        };
        match coll.first_match(filter)? {
            Some(pos) => {
                coll.docs.remove(pos);
                Ok(DeleteResult { deleted_count: 1 })
            }
            None => Ok(DeleteResult::default()),
        }
    }

    fn aggregate(&self, collection: &str, pipeline: &Value) -> Result<Vec<Value>> {
        let pipeline = Pipeline::from_json(pipeline)?;
        let docs = self
            .state
            .read()
            .collections
            .get(collection)
            .map(|c| c.docs.clone())
            .unwrap_or_default();
        pipeline.execute(docs)
    }

    // ========================================================================
    // INDEXES & DIAGNOSTICS
    // ========================================================================

    fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<String> {
        let ns = self.namespace(collection);
        let mut state = self.state.write();
        let coll = state.collections.entry(collection.to_string()).or_default();

        if index.unique {
            let mut seen = std::collections::HashSet::new();
            for doc in &coll.docs {
                let key = unique_key(doc, index);
                if !seen.insert(key.clone()) {
                    return Err(CatalogError::store(format!(
                        "E11000 duplicate key error collection: {} index: {} dup key: {}",
                        ns,
                        index.name(),
                        key
                    )));
                }
            }
        }
        coll.indexes.create(index)
    }

    fn list_indexes(&self, collection: &str) -> Result<Vec<String>> {
        self.state
            .read()
            .collections
            .get(collection)
            .map(|c| c.indexes.names())
            .ok_or_else(|| CatalogError::store(format!("ns does not exist: {}", self.namespace(collection))))
    }

    fn explain_find(&self, collection: &str, filter: &Value) -> Result<Value> {
        let state = self.state.read();
        self.explain_plan(state.collections.get(collection), &self.namespace(collection), filter)
    }

    fn namespace(&self, collection: &str) -> String {
        format!("{}.{}", self.database, collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new("shop");
        store
            .insert_many(
                "books",
                vec![
                    json!({"title": "A", "price": 10}),
                    json!({"title": "B", "price": 20}),
                    json!({"title": "A", "price": 30}),
                ],
            )
            .unwrap();
        store
    }

    #[test]
    fn test_insert_assigns_ids() {
        let store = seeded();
        let docs = store.find("books", &json!({}), &FindOptions::new()).unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d["_id"].clone()).collect();
        assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);
        assert_eq!(store.count("books"), 3);
    }

    #[test]
    fn test_auto_ids_skip_explicit_ids() {
        let store = MemoryStore::default();
        store.insert_many("books", vec![json!({"_id": 2})]).unwrap();
        store
            .insert_many("books", vec![json!({"title": "x"}), json!({"title": "y"})])
            .unwrap();
        store.insert_many("books", vec![json!({"_id": 7.0}), json!({"title": "z"})]).unwrap();
        store.insert_many("books", vec![json!({"_id": "isbn-1"}), json!({"title": "w"})]).unwrap();

        let ids: Vec<_> = store
            .find("books", &json!({}), &FindOptions::new())
            .unwrap()
            .iter()
            .map(|d| d["_id"].clone())
            .collect();
        assert_eq!(
            ids,
            vec![json!(2), json!(3), json!(4), json!(7.0), json!(8), json!("isbn-1"), json!(9)]
        );
    }

    #[test]
    fn test_duplicate_id_rejected_after_partial_insert() {
        let store = seeded();
        let err = store
            .insert_many("books", vec![json!({"_id": 10}), json!({"_id": 1})])
            .unwrap_err();
        assert!(err.to_string().contains("E11000"));
        assert_eq!(store.count("books"), 4);
    }

    #[test]
    fn test_find_on_missing_collection_is_empty() {
        let store = MemoryStore::default();
        assert!(store.find("nope", &json!({}), &FindOptions::new()).unwrap().is_empty());
        assert!(store.find("nope", &json!({"a": {"$bad": 1}}), &FindOptions::new()).is_err());
    }

    #[test]
    fn test_update_one_touches_first_match_only() {
        let store = seeded();
        let result = store
            .update_one("books", &json!({"title": "A"}), &json!({"$set": {"price": 5}}))
            .unwrap();
        assert_eq!(result, UpdateResult { matched_count: 1, modified_count: 1 });

        let prices: Vec<_> = store
            .find("books", &json!({"title": "A"}), &FindOptions::new())
            .unwrap()
            .iter()
            .map(|d| d["price"].clone())
            .collect();
        assert_eq!(prices, vec![json!(5), json!(30)]);
    }

    #[test]
    fn test_update_same_value_is_not_a_modification() {
        let store = seeded();
        let result = store
            .update_one("books", &json!({"title": "B"}), &json!({"$set": {"price": 20}}))
            .unwrap();
        assert_eq!(result, UpdateResult { matched_count: 1, modified_count: 0 });
    }

    #[test]
    fn test_update_rejects_replacement_and_id_changes() {
        let store = seeded();
        assert!(store.update_one("books", &json!({}), &json!({"price": 1})).is_err());
        assert!(store.update_one("books", &json!({}), &json!({"$set": {"_id": 9}})).is_err());
        assert!(store.update_one("books", &json!({}), &json!({"$inc": {"price": 1}})).is_err());
        assert!(store
            .update_one("books", &json!({}), &json!({"$unset": {"price": ""}}))
            .is_ok());
    }

    #[test]
    fn test_delete_one() {
        let store = seeded();
        assert_eq!(store.delete_one("books", &json!({"title": "A"})).unwrap().deleted_count, 1);
        assert_eq!(store.delete_one("books", &json!({"title": "Z"})).unwrap().deleted_count, 0);
        assert_eq!(store.delete_one("other", &json!({})).unwrap().deleted_count, 0);
        assert_eq!(store.count("books"), 2);
    }

    #[test]
    fn test_unique_index_enforced() {
        let store = seeded();
        let unique_title = IndexSpec::ascending(&["title"]).unique();
        assert!(store.create_index("books", &unique_title).is_err());

        store.delete_one("books", &json!({"title": "A"})).unwrap();
        store.create_index("books", &unique_title).unwrap();
        let err = store.insert_many("books", vec![json!({"title": "B"})]).unwrap_err();
        assert!(matches!(err, CatalogError::Store(_)));
    }

    #[test]
    fn test_list_indexes() {
        let store = seeded();
        assert_eq!(store.list_indexes("books").unwrap(), vec!["_id_"]);
        assert!(store.list_indexes("missing").is_err());
        store.create_index("books", &IndexSpec::ascending(&["title"])).unwrap();
        assert_eq!(store.list_indexes("books").unwrap(), vec!["_id_", "title_1"]);
    }

    #[test]
    fn test_explain_switches_to_index_scan() {
        let store = seeded();
        let filter = json!({"title": "A"});

        let plan = store.explain_find("books", &filter).unwrap();
        assert_eq!(plan["queryPlanner"]["winningPlan"]["stage"], COLLSCAN);
        assert_eq!(plan["executionStats"]["totalDocsExamined"], 3);
        assert_eq!(plan["executionStats"]["nReturned"], 2);

        store.create_index("books", &IndexSpec::ascending(&["title"])).unwrap();
        let plan = store.explain_find("books", &filter).unwrap();
        let input = &plan["queryPlanner"]["winningPlan"]["inputStage"];
        assert_eq!(input["stage"], IXSCAN);
        assert_eq!(input["indexName"], "title_1");
        assert_eq!(plan["executionStats"]["totalDocsExamined"], 2);
        assert_eq!(plan["queryPlanner"]["namespace"], "shop.books");
    }
}
