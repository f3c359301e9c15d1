// bookstore-core/src/lib.rs
// Book catalog over a MongoDB-compatible document store

pub mod aggregation;
pub mod catalog;
pub mod config;
pub mod error;
pub mod explain;
pub mod find_options;
pub mod index;
pub mod logging;
pub mod model;
pub mod query;
pub mod report;
pub mod storage;
pub mod value_utils;

// Public exports
pub use catalog::{catalog_indexes, BookCatalogClient};
pub use config::CatalogConfig;
pub use error::{CatalogError, Result};
pub use explain::ExecutionPlan;
pub use find_options::{FindOptions, SortDirection};
pub use index::IndexSpec;
pub use logging::{init_logging, LogLevel};
pub use model::{Book, BookSummary};
pub use report::{AuthorBookCount, DecadeCount, GenreAveragePrice};
pub use storage::{DeleteResult, DocumentStore, InsertResult, MemoryStore, MongoStore, UpdateResult};
