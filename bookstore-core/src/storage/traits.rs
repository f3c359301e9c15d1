// src/storage/traits.rs
//! Document store abstraction
//!
//! The catalog client talks to its datastore only through this trait, which
//! enables:
//! - Dependency injection of the backend
//! - Easy testing with MemoryStore
//!
//! # Architecture
//!
//! ```text
//! DocumentStore trait (unified interface)
//!   ├── MongoStore (production, MongoDB wire protocol)
//!   └── MemoryStore (testing, in-process)
//! ```
//!
//! Filters, update documents and pipelines are MongoDB-syntax JSON values.

use crate::error::Result;
use crate::find_options::FindOptions;
use crate::index::IndexSpec;
use crate::storage::{DeleteResult, InsertResult, UpdateResult};
use serde_json::Value;

/// Core store abstraction
///
/// Every method is one round trip. Methods take `&self`: implementations
/// handle their own synchronization so one handle can serve many threads.
pub trait DocumentStore: Send + Sync {
    // ========================================================================
    // COLLECTION MANAGEMENT
    // ========================================================================

    /// Create a collection; an existing collection is not an error
    fn create_collection(&self, name: &str) -> Result<()>;

    /// List collection names
    fn list_collections(&self) -> Result<Vec<String>>;

    // ========================================================================
    // DOCUMENT OPERATIONS
    // ========================================================================

    /// Insert documents; the store assigns `_id` where missing
    fn insert_many(&self, collection: &str, docs: Vec<Value>) -> Result<InsertResult>;

    /// All documents matching `filter`, shaped by `options`
    fn find(&self, collection: &str, filter: &Value, options: &FindOptions) -> Result<Vec<Value>>;

    /// Apply `update` to the first document matching `filter`
    fn update_one(&self, collection: &str, filter: &Value, update: &Value) -> Result<UpdateResult>;

    /// Delete the first document matching `filter`
    fn delete_one(&self, collection: &str, filter: &Value) -> Result<DeleteResult>;

    /// Run an aggregation pipeline (JSON array of stages)
    fn aggregate(&self, collection: &str, pipeline: &Value) -> Result<Vec<Value>>;

    // ========================================================================
    // INDEXES & DIAGNOSTICS
    // ========================================================================

    /// Create an index; returns its name. Identical re-creation is a no-op
    fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<String>;

    /// List index names of a collection
    fn list_indexes(&self, collection: &str) -> Result<Vec<String>>;

    /// Explain a find at `executionStats` verbosity, returned unmodified
    fn explain_find(&self, collection: &str, filter: &Value) -> Result<Value>;

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Release the connection. Calls after `close` are not supported
    fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Namespace description for logs (`database.collection`)
    fn namespace(&self, collection: &str) -> String {
        collection.to_string()
    }
}
