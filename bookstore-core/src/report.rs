// bookstore-core/src/report.rs
//! Aggregation reports over the `books` collection
//!
//! Each report is a pipeline plus the typed row it produces. Group keys are
//! `Option`s: books missing the grouped field form a `null` group on the
//! server, and that group is surfaced rather than dropped.

use crate::error::{CatalogError, Result};
use crate::model::fields;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Average price of one genre
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreAveragePrice {
    pub genre: Option<String>,
    #[serde(rename = "averagePrice")]
    pub average_price: f64,
}

/// Number of books by one author
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorBookCount {
    pub author: Option<String>,
    pub books: u64,
}

/// Number of books published in one decade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecadeCount {
    pub decade: Option<i32>,
    pub count: u64,
}

/// Decade row as the server returns it; `$divide` makes the key a double
#[derive(Debug, Deserialize)]
struct RawDecadeCount {
    decade: Option<f64>,
    count: u64,
}

fn field_ref(field: &str) -> String {
    format!("${}", field)
}

/// Mean price per genre, highest first, ties by genre name
pub fn average_price_by_genre_pipeline() -> Value {
    json!([
        {"$group": {"_id": field_ref(fields::GENRE), "averagePrice": {"$avg": field_ref(fields::PRICE)}}},
        {"$project": {"_id": 0, "genre": "$_id", "averagePrice": 1}},
        {"$sort": {"averagePrice": -1, "genre": 1}}
    ])
}

/// Book count per author, top one; equal counts resolve to the
/// lexicographically smallest author
pub fn author_with_most_books_pipeline() -> Value {
    json!([
        {"$group": {"_id": field_ref(fields::AUTHOR), "books": {"$sum": 1}}},
        {"$project": {"_id": 0, "author": "$_id", "books": 1}},
        {"$sort": {"books": -1, "author": 1}},
        {"$limit": 1}
    ])
}

/// Book count per decade of publication, oldest first
pub fn counts_by_decade_pipeline() -> Value {
    json!([
        {"$addFields": {"decade": {"$multiply": [
            {"$floor": {"$divide": [field_ref(fields::PUBLISHED_YEAR), 10]}},
            10
        ]}}},
        {"$group": {"_id": "$decade", "count": {"$sum": 1}}},
        {"$sort": {"_id": 1}},
        {"$project": {"_id": 0, "decade": "$_id", "count": 1}}
    ])
}

pub(crate) fn parse_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(CatalogError::from))
        .collect()
}

/// Whole-number decade key within `i32`; anything else is a malformed row
fn decade_key(raw: f64) -> Result<i32> {
    if raw.fract() != 0.0 || raw < f64::from(i32::MIN) || raw > f64::from(i32::MAX) {
        return Err(CatalogError::Serialization(format!(
            "decade key is not a whole year: {}",
            raw
        )));
    }
    Ok(raw as i32)
}

pub(crate) fn parse_decades(rows: Vec<Value>) -> Result<Vec<DecadeCount>> {
    parse_rows::<RawDecadeCount>(rows)?
        .into_iter()
        .map(|raw| -> Result<DecadeCount> {
            Ok(DecadeCount {
                decade: raw.decade.map(decade_key).transpose()?,
                count: raw.count,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipelines_use_canonical_year_field() {
        let text = counts_by_decade_pipeline().to_string();
        assert!(text.contains("$published_year"));
        assert!(!text.contains("\"$year\""));
    }

    #[test]
    fn test_sort_keys_keep_tiebreak_order() {
        let pipeline = author_with_most_books_pipeline();
        let sort = pipeline[2]["$sort"].as_object().unwrap();
        let keys: Vec<_> = sort.keys().cloned().collect();
        assert_eq!(keys, vec!["books", "author"]);
    }

    #[test]
    fn test_parse_decades_from_double_keys() {
        let rows = vec![
            json!({"decade": 1980.0, "count": 2}),
            json!({"decade": null, "count": 1}),
        ];
        let decades = parse_decades(rows).unwrap();
        assert_eq!(decades[0], DecadeCount { decade: Some(1980), count: 2 });
        assert_eq!(decades[1], DecadeCount { decade: None, count: 1 });
    }

    #[test]
    fn test_parse_decades_rejects_out_of_range_keys() {
        for bad in [json!(1985.5), json!(1e12), json!(-1e12)] {
            let rows = vec![json!({"decade": bad, "count": 1})];
            assert!(matches!(parse_decades(rows), Err(CatalogError::Serialization(_))));
        }
    }

    #[test]
    fn test_parse_rows_rejects_bad_shape() {
        let rows = vec![json!({"genre": "F", "averagePrice": "cheap"})];
        assert!(parse_rows::<GenreAveragePrice>(rows).is_err());
    }

    #[test]
    fn test_genre_row_wire_names() {
        let row = GenreAveragePrice { genre: Some("F".into()), average_price: 15.0 };
        assert_eq!(serde_json::to_value(&row).unwrap(), json!({"genre": "F", "averagePrice": 15.0}));
    }
}
