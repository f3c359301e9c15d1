// bookstore-core/src/storage/mod.rs
//! Store backends and the write-result types they share

pub mod memory_storage;
pub mod mongo_storage;
pub mod traits;

use serde::{Deserialize, Serialize};

pub use memory_storage::MemoryStore;
pub use mongo_storage::MongoStore;
pub use traits::DocumentStore;

/// Outcome of an update: documents matched by the filter and actually changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    #[serde(rename = "matchedCount")]
    pub matched_count: u64,
    #[serde(rename = "modifiedCount")]
    pub modified_count: u64,
}

impl UpdateResult {
    /// Turn a zero-match outcome into `NotFound`, for callers that require a match
    pub fn ensure_matched(self, what: &str) -> crate::error::Result<Self> {
        if self.matched_count == 0 {
            return Err(crate::error::CatalogError::NotFound(what.to_string()));
        }
        Ok(self)
    }
}

/// Outcome of a delete
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResult {
    #[serde(rename = "deletedCount")]
    pub deleted_count: u64,
}

/// Outcome of a bulk insert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertResult {
    #[serde(rename = "insertedCount")]
    pub inserted_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;

    #[test]
    fn test_ensure_matched() {
        let hit = UpdateResult { matched_count: 1, modified_count: 0 };
        assert_eq!(hit.ensure_matched("Moby Dick").unwrap(), hit);

        let miss = UpdateResult::default();
        match miss.ensure_matched("Moby Dick") {
            Err(CatalogError::NotFound(what)) => assert_eq!(what, "Moby Dick"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
