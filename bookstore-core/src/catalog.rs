// bookstore-core/src/catalog.rs
// Book catalog client - typed operations over a DocumentStore
//
// FILE STRUCTURE:
// ├── Constructors (connect, in_memory, new)
// ├── Load (ensure_collection, insert_books)
// ├── Lookups (find_by_genre/year/author/title, find_in_stock_after_year)
// ├── Mutations (update_price, delete_by_title)
// ├── Projection & pagination (project_summary, page_by_price)
// ├── Reports (average_price_by_genre, author_with_most_books, counts_by_decade)
// ├── Indexes & plans (ensure_indexes, list_indexes, explain_query)
// └── close

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};
use crate::explain::ExecutionPlan;
use crate::find_options::{FindOptions, SortDirection};
use crate::index::IndexSpec;
use crate::model::{fields, validate_price, Book, BookSummary};
use crate::report::{
    author_with_most_books_pipeline, average_price_by_genre_pipeline, counts_by_decade_pipeline,
    parse_decades, parse_rows, AuthorBookCount, DecadeCount, GenreAveragePrice,
};
use crate::storage::{DeleteResult, DocumentStore, InsertResult, MemoryStore, MongoStore, UpdateResult};

/// Indexes the catalog relies on: title lookups and author+year queries
pub fn catalog_indexes() -> Vec<IndexSpec> {
    vec![
        IndexSpec::ascending(&[fields::TITLE]),
        IndexSpec::ascending(&[fields::AUTHOR, fields::PUBLISHED_YEAR]),
    ]
}

/// Typed client for the `books` collection
///
/// Generic over the store backend:
/// - `BookCatalogClient<MongoStore>` - production, MongoDB server
/// - `BookCatalogClient<MemoryStore>` - in-process, for tests and demos
///
/// Every method is a single round trip; arguments are validated before
/// anything is dispatched.
pub struct BookCatalogClient<S: DocumentStore> {
    store: S,
    collection: String,
}

impl BookCatalogClient<MongoStore> {
    /// Connect to the MongoDB server named by `config`
    pub fn connect(config: &CatalogConfig) -> Result<Self> {
        config.validate()?;
        let store = MongoStore::connect(config)?;
        Ok(Self::new(store, &config.collection))
    }
}

impl BookCatalogClient<MemoryStore> {
    /// Client over a fresh in-memory store (`plp_bookstore.books`)
    pub fn in_memory() -> Self {
        let defaults = CatalogConfig::default();
        Self::new(MemoryStore::new(&defaults.database), &defaults.collection)
    }
}

impl<S: DocumentStore> BookCatalogClient<S> {
    // ========== CONSTRUCTOR ==========

    pub fn new(store: S, collection: &str) -> Self {
        BookCatalogClient {
            store,
            collection: collection.to_string(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    // ========== LOAD ==========

    /// Create the collection if it does not exist yet
    pub fn ensure_collection(&self) -> Result<()> {
        self.store.create_collection(&self.collection)
    }

    /// Insert books; every book is validated before the batch is sent
    pub fn insert_books(&self, books: &[Book]) -> Result<InsertResult> {
        let docs = books
            .iter()
            .map(|book| {
                book.validate()?;
                book.to_document()
            })
            .collect::<Result<Vec<_>>>()?;
        if docs.is_empty() {
            return Ok(InsertResult::default());
        }
        let result = self.store.insert_many(&self.collection, docs)?;
        info!(
            "inserted {} books into {}",
            result.inserted_count,
            self.store.namespace(&self.collection)
        );
        Ok(result)
    }

    // ========== LOOKUPS ==========

    /// Books whose `genre` equals `genre` exactly
    pub fn find_by_genre(&self, genre: &str) -> Result<Vec<Book>> {
        self.find_books(json!({ fields::GENRE: genre }), &FindOptions::new())
    }

    pub fn find_by_year(&self, year: i32) -> Result<Vec<Book>> {
        self.find_books(json!({ fields::PUBLISHED_YEAR: year }), &FindOptions::new())
    }

    pub fn find_by_author(&self, author: &str) -> Result<Vec<Book>> {
        self.find_books(json!({ fields::AUTHOR: author }), &FindOptions::new())
    }

    pub fn find_by_title(&self, title: &str) -> Result<Vec<Book>> {
        require_title(title)?;
        self.find_books(json!({ fields::TITLE: title }), &FindOptions::new())
    }

    /// In-stock books published strictly after `year`
    pub fn find_in_stock_after_year(&self, year: i32) -> Result<Vec<Book>> {
        let filter = json!({
            fields::IN_STOCK: true,
            fields::PUBLISHED_YEAR: { "$gt": year }
        });
        self.find_books(filter, &FindOptions::new())
    }

    // ========== MUTATIONS ==========

    /// Set the price of the first book titled `title`
    ///
    /// No match is not an error: the result reports zero counts. Use
    /// `UpdateResult::ensure_matched` to require one.
    pub fn update_price(&self, title: &str, new_price: f64) -> Result<UpdateResult> {
        require_title(title)?;
        validate_price(new_price)?;
        let filter = json!({ fields::TITLE: title });
        let update = json!({ "$set": { fields::PRICE: new_price } });
        debug!("update_one on {}: {} {}", self.collection, filter, update);
        let result = self.store.update_one(&self.collection, &filter, &update)?;
        info!(
            "update_price '{}': matched {}, modified {}",
            title, result.matched_count, result.modified_count
        );
        Ok(result)
    }

    /// Delete the first book titled `title`
    pub fn delete_by_title(&self, title: &str) -> Result<DeleteResult> {
        require_title(title)?;
        let filter = json!({ fields::TITLE: title });
        debug!("delete_one on {}: {}", self.collection, filter);
        let result = self.store.delete_one(&self.collection, &filter)?;
        info!("delete_by_title '{}': deleted {}", title, result.deleted_count);
        Ok(result)
    }

    // ========== PROJECTION & PAGINATION ==========

    /// Title, author and price of every book, without `_id`
    pub fn project_summary(&self) -> Result<Vec<BookSummary>> {
        let options = FindOptions::new().with_fields_only(&[fields::TITLE, fields::AUTHOR, fields::PRICE]);
        let docs = self.find_raw(&json!({}), &options)?;
        parse_rows(docs)
    }

    /// One page of books ordered by price
    ///
    /// Ties are broken by `title` then `_id`, both ascending, so pages never
    /// overlap. `page_index` is zero-based.
    pub fn page_by_price(
        &self,
        direction: SortDirection,
        page_size: i64,
        page_index: i64,
    ) -> Result<Vec<Book>> {
        if page_size <= 0 {
            return Err(CatalogError::invalid(format!(
                "page size must be positive, got {}",
                page_size
            )));
        }
        if page_index < 0 {
            return Err(CatalogError::invalid(format!(
                "page index must not be negative, got {}",
                page_index
            )));
        }
        let skip = page_index.checked_mul(page_size).ok_or_else(|| {
            CatalogError::invalid(format!(
                "page {} of size {} is out of range",
                page_index, page_size
            ))
        })?;

        let options = FindOptions::new()
            .with_sort(fields::PRICE, direction)
            .with_sort(fields::TITLE, SortDirection::Ascending)
            .with_sort(fields::ID, SortDirection::Ascending)
            .with_skip(skip as u64)
            .with_limit(page_size as u64);
        self.find_books(json!({}), &options)
    }

    // ========== REPORTS ==========

    /// Mean price per genre, most expensive first
    pub fn average_price_by_genre(&self) -> Result<Vec<GenreAveragePrice>> {
        let rows = self.aggregate(&average_price_by_genre_pipeline())?;
        parse_rows(rows)
    }

    /// Author with the most books; `None` when the collection is empty
    pub fn author_with_most_books(&self) -> Result<Option<AuthorBookCount>> {
        let rows = self.aggregate(&author_with_most_books_pipeline())?;
        Ok(parse_rows(rows)?.into_iter().next())
    }

    /// Books per decade of publication, oldest decade first
    pub fn counts_by_decade(&self) -> Result<Vec<DecadeCount>> {
        let rows = self.aggregate(&counts_by_decade_pipeline())?;
        parse_decades(rows)
    }

    // ========== INDEXES & PLANS ==========

    /// Create the catalog indexes if missing; returns their names
    pub fn ensure_indexes(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for spec in catalog_indexes() {
            let name = self.store.create_index(&self.collection, &spec)?;
            info!("index {} ready on {}", name, self.store.namespace(&self.collection));
            names.push(name);
        }
        Ok(names)
    }

    pub fn list_indexes(&self) -> Result<Vec<String>> {
        self.store.list_indexes(&self.collection)
    }

    /// Execution plan and statistics of the `{author, published_year}` query
    pub fn explain_query(&self, author: &str, year: i32) -> Result<ExecutionPlan> {
        let filter = json!({ fields::AUTHOR: author, fields::PUBLISHED_YEAR: year });
        debug!("explain on {}: {}", self.collection, filter);
        let raw = self.store.explain_find(&self.collection, &filter)?;
        Ok(ExecutionPlan::new(raw))
    }

    /// Release the store connection
    pub fn close(self) -> Result<()> {
        self.store.close()
    }

    // ========== PRIVATE HELPERS ==========

    fn find_raw(&self, filter: &Value, options: &FindOptions) -> Result<Vec<Value>> {
        debug!("find on {}: {} {:?}", self.collection, filter, options);
        self.store.find(&self.collection, filter, options)
    }

    fn find_books(&self, filter: Value, options: &FindOptions) -> Result<Vec<Book>> {
        Book::from_documents(self.find_raw(&filter, options)?)
    }

    fn aggregate(&self, pipeline: &Value) -> Result<Vec<Value>> {
        debug!("aggregate on {}: {}", self.collection, pipeline);
        self.store.aggregate(&self.collection, pipeline)
    }
}

fn require_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(CatalogError::invalid("title must not be empty"));
    }
    Ok(())
}
