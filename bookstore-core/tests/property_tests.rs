// Property tests for catalog invariants (in-memory store)
use bookstore_core::{Book, BookCatalogClient, MemoryStore, SortDirection};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

const GENRES: &[&str] = &["Fiction", "Fantasy", "Romance", "Poetry"];
const AUTHORS: &[&str] = &["Austen", "Brontë", "Orwell", "Tolkien"];

fn arb_book() -> impl Strategy<Value = Book> {
    (
        "[A-E][a-z]{0,3}",
        0..AUTHORS.len(),
        0..GENRES.len(),
        1800i32..2025,
        0u32..5000,
        any::<bool>(),
    )
        .prop_map(|(title, author, genre, year, cents, in_stock)| {
            Book::new(
                &title,
                AUTHORS[author],
                GENRES[genre],
                year,
                f64::from(cents) / 100.0,
                in_stock,
            )
        })
}

fn loaded(books: &[Book]) -> BookCatalogClient<MemoryStore> {
    let client = BookCatalogClient::in_memory();
    client.insert_books(books).unwrap();
    client
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_genre_lookup_is_exact_subset(books in prop::collection::vec(arb_book(), 0..30), g in 0..GENRES.len()) {
        let client = loaded(&books);
        let genre = GENRES[g];
        let found = client.find_by_genre(genre).unwrap();
        let expected = books.iter().filter(|b| b.genre == genre).count();
        prop_assert_eq!(found.len(), expected);
        prop_assert!(found.iter().all(|b| b.genre == genre));
    }

    #[test]
    fn prop_pages_partition_the_full_order(
        books in prop::collection::vec(arb_book(), 0..30),
        page_size in 1i64..7,
        descending in any::<bool>(),
    ) {
        let client = loaded(&books);
        let direction = SortDirection::from_ascending(!descending);

        let mut seen = Vec::new();
        let mut page_index = 0;
        loop {
            let page = client.page_by_price(direction, page_size, page_index).unwrap();
            prop_assert!(page.len() as i64 <= page_size);
            if page.is_empty() {
                break;
            }
            seen.extend(page);
            page_index += 1;
        }

        // Disjoint and complete
        let ids: HashSet<String> = seen.iter().map(|b| b.id.clone().unwrap().to_string()).collect();
        prop_assert_eq!(ids.len(), books.len());
        prop_assert_eq!(seen.len(), books.len());

        // Ordered by price, then title
        for pair in seen.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let price_ok = match direction {
                SortDirection::Ascending => a.price <= b.price,
                SortDirection::Descending => a.price >= b.price,
            };
            prop_assert!(price_ok);
            if a.price == b.price {
                prop_assert!(a.title <= b.title);
            }
        }
    }

    #[test]
    fn prop_genre_averages_reconstruct_total(books in prop::collection::vec(arb_book(), 1..30)) {
        let client = loaded(&books);
        let mut counts: HashMap<String, u64> = HashMap::new();
        for book in &books {
            *counts.entry(book.genre.clone()).or_default() += 1;
        }

        let rows = client.average_price_by_genre().unwrap();
        prop_assert_eq!(rows.len(), counts.len());
        let reconstructed: f64 = rows
            .iter()
            .map(|row| counts[row.genre.as_deref().unwrap()] as f64 * row.average_price)
            .sum();
        let total: f64 = books.iter().map(|b| b.price).sum();
        prop_assert!((reconstructed - total).abs() < 1e-6);

        for pair in rows.windows(2) {
            prop_assert!(pair[0].average_price >= pair[1].average_price);
        }
    }

    #[test]
    fn prop_update_then_lookup(books in prop::collection::vec(arb_book(), 1..20), pick in any::<prop::sample::Index>(), cents in 0u32..5000) {
        let client = loaded(&books);
        let title = &books[pick.index(books.len())].title;
        let price = f64::from(cents) / 100.0;

        let result = client.update_price(title, price).unwrap();
        prop_assert_eq!(result.matched_count, 1);
        let prices: Vec<f64> = client.find_by_title(title).unwrap().iter().map(|b| b.price).collect();
        prop_assert!(prices.contains(&price));
    }

    #[test]
    fn prop_decades_count_every_book(books in prop::collection::vec(arb_book(), 0..30)) {
        let client = loaded(&books);
        let decades = client.counts_by_decade().unwrap();
        let total: u64 = decades.iter().map(|d| d.count).sum();
        prop_assert_eq!(total, books.len() as u64);
        for row in &decades {
            let decade = row.decade.unwrap();
            prop_assert_eq!(decade % 10, 0);
            let expected = books
                .iter()
                .filter(|b| b.published_year / 10 * 10 == decade)
                .count() as u64;
            prop_assert_eq!(row.count, expected);
        }
    }
}
