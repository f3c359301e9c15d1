// bookstore-core/src/model.rs
//! Typed documents of the `books` collection
//!
//! Raw store documents are converted here, once, at the store boundary.
//! Extra fields (`pages`, `publisher`, ...) ride along in `Book::extra` so a
//! load keeps them in the store.

use crate::error::{CatalogError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Canonical field names, used by every filter, sort, index and pipeline
pub mod fields {
    pub const ID: &str = "_id";
    pub const TITLE: &str = "title";
    pub const AUTHOR: &str = "author";
    pub const GENRE: &str = "genre";
    pub const PUBLISHED_YEAR: &str = "published_year";
    pub const PRICE: &str = "price";
    pub const IN_STOCK: &str = "in_stock";
}

/// A book document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// Store-assigned identifier, opaque to the catalog
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub title: String,
    pub author: String,
    pub genre: String,
    pub published_year: i32,
    pub price: f64,
    pub in_stock: bool,
    /// Fields outside the typed model, passed through untouched
    #[serde(flatten, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl Book {
    pub fn new(
        title: &str,
        author: &str,
        genre: &str,
        published_year: i32,
        price: f64,
        in_stock: bool,
    ) -> Self {
        Book {
            id: None,
            title: title.to_string(),
            author: author.to_string(),
            genre: genre.to_string(),
            published_year,
            price,
            in_stock,
            extra: Map::new(),
        }
    }

    /// Deserialize a store document
    pub fn from_document(doc: Value) -> Result<Self> {
        let title = doc
            .get(fields::TITLE)
            .and_then(Value::as_str)
            .map(str::to_string);
        serde_json::from_value(doc).map_err(|e| {
            CatalogError::Serialization(match title {
                Some(t) => format!("book '{}': {}", t, e),
                None => format!("book document: {}", e),
            })
        })
    }

    /// Deserialize a batch of store documents, failing on the first bad one
    pub fn from_documents(docs: Vec<Value>) -> Result<Vec<Self>> {
        docs.into_iter().map(Book::from_document).collect()
    }

    /// Document form for insertion
    pub fn to_document(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Check the invariants a book must satisfy before it is written
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(CatalogError::invalid("book title must not be empty"));
        }
        validate_price(self.price)
    }
}

/// Prices are finite and non-negative
pub fn validate_price(price: f64) -> Result<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(CatalogError::invalid(format!(
            "price must be a finite non-negative number, got {}",
            price
        )));
    }
    Ok(())
}

/// `{title, author, price}` projection of a book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSummary {
    pub title: String,
    pub author: String,
    pub price: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_document_keeps_extra_fields() {
        let doc = json!({
            "_id": {"$oid": "65f0c0ffee0000000000aaaa"},
            "title": "Moby Dick",
            "author": "Herman Melville",
            "genre": "Adventure",
            "published_year": 1851,
            "price": 12,
            "in_stock": false,
            "pages": 635,
            "publisher": "Harper & Brothers"
        });
        let book = Book::from_document(doc).unwrap();
        assert_eq!(book.title, "Moby Dick");
        assert_eq!(book.published_year, 1851);
        assert_eq!(book.price, 12.0);
        assert!(book.id.is_some());
        assert_eq!(book.extra["pages"], 635);
        assert!(!book.extra.contains_key("_id"));
        assert_eq!(book.to_document().unwrap()["publisher"], "Harper & Brothers");
    }

    #[test]
    fn test_from_document_reports_title_on_failure() {
        let doc = json!({"title": "Dune", "author": "Frank Herbert", "genre": "Sci-Fi"});
        let err = Book::from_document(doc).unwrap_err();
        match err {
            CatalogError::Serialization(msg) => assert!(msg.contains("Dune")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_to_document_omits_missing_id() {
        let book = Book::new("Emma", "Jane Austen", "Romance", 1815, 7.5, true);
        let doc = book.to_document().unwrap();
        assert!(doc.get("_id").is_none());
        assert!(doc.get("extra").is_none());
        assert_eq!(doc["published_year"], 1815);
    }

    #[test]
    fn test_validate() {
        assert!(Book::new("Emma", "Jane Austen", "Romance", 1815, 0.0, true).validate().is_ok());
        assert!(Book::new(" ", "Jane Austen", "Romance", 1815, 7.5, true).validate().is_err());
        assert!(Book::new("Emma", "Jane Austen", "Romance", 1815, -1.0, true).validate().is_err());
        assert!(validate_price(f64::NAN).is_err());
        assert!(validate_price(f64::INFINITY).is_err());
    }
}
