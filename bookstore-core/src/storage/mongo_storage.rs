// storage/mongo_storage.rs
//! MongoDB backend
//!
//! Wraps the async `mongodb` driver behind the blocking `DocumentStore`
//! trait. The store owns a private Tokio runtime; every call is one
//! `block_on` bounded by the configured operation timeout.

use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};
use crate::find_options::FindOptions;
use crate::index::IndexSpec;
use crate::storage::{DeleteResult, DocumentStore, InsertResult, UpdateResult};
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::ErrorKind;
use mongodb::options::{ClientOptions, FindOptions as DriverFindOptions, IndexOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// Server error codes the backend treats specially
const MAX_TIME_MS_EXPIRED: i32 = 50;
const NAMESPACE_EXISTS: i32 = 48;

impl From<mongodb::error::Error> for CatalogError {
    fn from(err: mongodb::error::Error) -> Self {
        classify_driver_error(err.kind.as_ref(), err.to_string())
    }
}

/// Map a driver error kind to the catalog variant; `text` is kept verbatim
fn classify_driver_error(kind: &ErrorKind, text: String) -> CatalogError {
    match kind {
        ErrorKind::ServerSelection { .. }
        | ErrorKind::Io(_)
        | ErrorKind::DnsResolve { .. }
        | ErrorKind::ConnectionPoolCleared { .. } => CatalogError::Connection(text),
        ErrorKind::Command(cmd) if cmd.code == MAX_TIME_MS_EXPIRED => CatalogError::Timeout {
            operation: cmd.code_name.clone(),
            timeout: Duration::ZERO,
        },
        _ => CatalogError::Store(text),
    }
}

fn command_code(err: &mongodb::error::Error) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Command(cmd) => Some(cmd.code),
        _ => None,
    }
}

/// JSON (relaxed extended JSON accepted) to a BSON document
fn to_bson_document(value: &Value) -> Result<Document> {
    match Bson::try_from(value.clone()) {
        Ok(Bson::Document(doc)) => Ok(doc),
        Ok(other) => Err(CatalogError::Serialization(format!(
            "expected a document, got {}",
            other
        ))),
        Err(e) => Err(CatalogError::Serialization(e.to_string())),
    }
}

fn to_json(doc: Document) -> Value {
    Bson::Document(doc).into_relaxed_extjson()
}

fn to_bson_pipeline(pipeline: &Value) -> Result<Vec<Document>> {
    pipeline
        .as_array()
        .ok_or_else(|| CatalogError::store("pipeline must be an array of stages"))?
        .iter()
        .map(to_bson_document)
        .collect()
}

fn driver_find_options(options: &FindOptions) -> Result<DriverFindOptions> {
    let mut driver = DriverFindOptions::default();
    driver.projection = options
        .projection_document()
        .as_ref()
        .map(to_bson_document)
        .transpose()?;
    driver.sort = options
        .sort_document()
        .as_ref()
        .map(to_bson_document)
        .transpose()?;
    driver.skip = options.skip;
    driver.limit = options
        .limit
        .map(|limit| {
            i64::try_from(limit)
                .map_err(|_| CatalogError::invalid(format!("limit out of range: {}", limit)))
        })
        .transpose()?;
    Ok(driver)
}

/// MongoDB-backed document store
pub struct MongoStore {
    client: Client,
    database: String,
    timeout: Duration,
    runtime: Runtime,
}

impl MongoStore {
    /// Connect and verify the server answers a `ping`
    ///
    /// Fails with `Connection` when no server can be selected within the
    /// configured timeout.
    pub fn connect(config: &CatalogConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("bookstore-mongo")
            .enable_all()
            .build()
            .map_err(|e| CatalogError::Connection(format!("failed to start runtime: {}", e)))?;

        let timeout = config.timeout();
        let uri = config.uri.clone();
        let app_name = config.app_name.clone();
        debug!("connecting to {} (database {})", config.uri, config.database);

        let client = runtime.block_on(async move {
            let mut options = ClientOptions::parse(&uri).await?;
            options.app_name = Some(app_name);
            options.connect_timeout = Some(timeout);
            options.server_selection_timeout = Some(timeout);
            Client::with_options(options)
        })?;

        let store = MongoStore {
            client,
            database: config.database.clone(),
            timeout,
            runtime,
        };
        let db = store.db();
        store
            .run("ping", async move { db.run_command(doc! {"ping": 1}).await })
            .map_err(|e| match e {
                CatalogError::Timeout { .. } => CatalogError::Connection(e.to_string()),
                other => other,
            })?;
        info!("connected to database {}", store.database);
        Ok(store)
    }

    fn db(&self) -> Database {
        self.client.database(&self.database)
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db().collection(name)
    }

    /// Block on `fut`, bounded by the operation timeout
    fn run<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = mongodb::error::Result<T>>,
    {
        let budget = self.timeout;
        let outcome = self
            .runtime
            .block_on(async move { tokio::time::timeout(budget, fut).await });
        match outcome {
            Ok(result) => result.map_err(|e| match CatalogError::from(e) {
                CatalogError::Timeout { .. } => CatalogError::Timeout {
                    operation: operation.to_string(),
                    timeout: budget,
                },
                other => other,
            }),
            Err(_) => Err(CatalogError::Timeout {
                operation: operation.to_string(),
                timeout: budget,
            }),
        }
    }
}

impl DocumentStore for MongoStore {
    fn create_collection(&self, name: &str) -> Result<()> {
        let db = self.db();
        let owned = name.to_string();
        let created = self.run("create_collection", async move {
            match db.create_collection(&owned).await {
                Ok(()) => Ok(true),
                Err(e) if command_code(&e) == Some(NAMESPACE_EXISTS) => Ok(false),
                Err(e) => Err(e),
            }
        })?;
        if created {
            info!("created collection {}", self.namespace(name));
        }
        Ok(())
    }

    fn list_collections(&self) -> Result<Vec<String>> {
        let db = self.db();
        self.run("list_collections", async move { db.list_collection_names().await })
    }

    fn insert_many(&self, collection: &str, docs: Vec<Value>) -> Result<InsertResult> {
        let docs = docs
            .iter()
            .map(to_bson_document)
            .collect::<Result<Vec<_>>>()?;
        if docs.is_empty() {
            return Ok(InsertResult::default());
        }
        let coll = self.collection(collection);
        let result = self.run("insert_many", async move { coll.insert_many(docs).await })?;
        Ok(InsertResult {
            inserted_count: result.inserted_ids.len() as u64,
        })
    }

    fn find(&self, collection: &str, filter: &Value, options: &FindOptions) -> Result<Vec<Value>> {
        let filter = to_bson_document(filter)?;
        let options = driver_find_options(options)?;
        let coll = self.collection(collection);
        let docs = self.run("find", async move {
            let cursor = coll.find(filter).with_options(options).await?;
            cursor.try_collect::<Vec<Document>>().await
        })?;
        Ok(docs.into_iter().map(to_json).collect())
    }

    fn update_one(&self, collection: &str, filter: &Value, update: &Value) -> Result<UpdateResult> {
        let filter = to_bson_document(filter)?;
        let update = to_bson_document(update)?;
        let coll = self.collection(collection);
        let result = self.run("update_one", async move { coll.update_one(filter, update).await })?;
        Ok(UpdateResult {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
        })
    }

    fn delete_one(&self, collection: &str, filter: &Value) -> Result<DeleteResult> {
        let filter = to_bson_document(filter)?;
        let coll = self.collection(collection);
        let result = self.run("delete_one", async move { coll.delete_one(filter).await })?;
        Ok(DeleteResult {
            deleted_count: result.deleted_count,
        })
    }

    fn aggregate(&self, collection: &str, pipeline: &Value) -> Result<Vec<Value>> {
        let pipeline = to_bson_pipeline(pipeline)?;
        let coll = self.collection(collection);
        let docs = self.run("aggregate", async move {
            let cursor = coll.aggregate(pipeline).await?;
            cursor.try_collect::<Vec<Document>>().await
        })?;
        Ok(docs.into_iter().map(to_json).collect())
    }

    fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<String> {
        let keys = to_bson_document(&index.key_pattern())?;
        let mut options = IndexOptions::default();
        options.name = Some(index.name());
        if index.unique {
            options.unique = Some(true);
        }
        let model = IndexModel::builder().keys(keys).options(options).build();
        let coll = self.collection(collection);
        let result = self.run("create_index", async move { coll.create_index(model).await })?;
        Ok(result.index_name)
    }

    fn list_indexes(&self, collection: &str) -> Result<Vec<String>> {
        let coll = self.collection(collection);
        self.run("list_indexes", async move { coll.list_index_names().await })
    }

    fn explain_find(&self, collection: &str, filter: &Value) -> Result<Value> {
        let command = doc! {
            "explain": {"find": collection, "filter": to_bson_document(filter)?},
            "verbosity": "executionStats",
        };
        let db = self.db();
        let plan = self.run("explain", async move { db.run_command(command).await })?;
        Ok(to_json(plan))
    }

    fn close(&self) -> Result<()> {
        let client = self.client.clone();
        self.runtime.block_on(async move { client.shutdown().await });
        info!("closed connection to database {}", self.database);
        Ok(())
    }

    fn namespace(&self, collection: &str) -> String {
        format!("{}.{}", self.database, collection)
    }
}
