use anyhow::{Context, Result};
use bookstore_core::{
    init_logging, Book, BookCatalogClient, CatalogConfig, LogLevel, MongoStore, SortDirection,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Parser)]
#[command(name = "bookstore")]
#[command(about = "Bookstore CLI - query and report on the books collection")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// MongoDB connection string, overrides the configuration
    #[arg(long, global = true)]
    uri: Option<String>,
    /// Database name, overrides the configuration
    #[arg(long, global = true)]
    database: Option<String>,
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the collection and insert books from a JSON array file
    Load {
        /// JSON file holding an array of book documents
        file: PathBuf,
    },
    /// Books of one genre
    Genre { genre: String },
    /// Books published in one year
    Year { year: i32 },
    /// Books by one author
    Author { author: String },
    /// Books with one title
    Title { title: String },
    /// Set the price of the first book with a title
    UpdatePrice {
        title: String,
        price: f64,
        /// Fail when no book matches
        #[arg(long)]
        strict: bool,
    },
    /// Delete the first book with a title
    Delete { title: String },
    /// In-stock books published after a year
    InStockAfter { year: i32 },
    /// Title, author and price of every book
    Summary,
    /// One page of books ordered by price
    Page {
        /// Most expensive first
        #[arg(long)]
        desc: bool,
        #[arg(long, default_value_t = 5)]
        size: i64,
        /// Zero-based page number
        #[arg(long, default_value_t = 0)]
        page: i64,
    },
    /// Average price per genre
    AvgPrice,
    /// Author with the most books
    TopAuthor,
    /// Book counts per publication decade
    Decades,
    /// Create the title and author/year indexes
    EnsureIndexes,
    /// List index names
    Indexes,
    /// Query plan of the author/year lookup
    Explain { author: String, year: i32 },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    let level = match cli.log_level {
        Some(level) => level,
        None => config.level()?,
    };
    init_logging(level);
    debug!("using {} / {}.{}", config.uri, config.database, config.collection);

    let client = BookCatalogClient::connect(&config)
        .with_context(|| format!("Failed to connect to {}", config.uri))?;
    let outcome = run(&client, cli.command);
    client.close().context("Failed to close the connection")?;
    outcome
}

fn load_config(cli: &Cli) -> Result<CatalogConfig> {
    let mut config = CatalogConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(uri) = &cli.uri {
        config.uri = uri.clone();
    }
    if let Some(database) = &cli.database {
        config.database = database.clone();
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn run(client: &BookCatalogClient<MongoStore>, command: Commands) -> Result<()> {
    match command {
        Commands::Load { file } => load_books(client, &file),
        Commands::Genre { genre } => print_json(&client.find_by_genre(&genre)?),
        Commands::Year { year } => print_json(&client.find_by_year(year)?),
        Commands::Author { author } => print_json(&client.find_by_author(&author)?),
        Commands::Title { title } => print_json(&client.find_by_title(&title)?),
        Commands::UpdatePrice { title, price, strict } => {
            let mut result = client
                .update_price(&title, price)
                .with_context(|| format!("Failed to update price of '{}'", title))?;
            if strict {
                result = result.ensure_matched(&title)?;
            }
            print_json(&result)
        }
        Commands::Delete { title } => print_json(
            &client
                .delete_by_title(&title)
                .with_context(|| format!("Failed to delete '{}'", title))?,
        ),
        Commands::InStockAfter { year } => print_json(&client.find_in_stock_after_year(year)?),
        Commands::Summary => print_json(&client.project_summary()?),
        Commands::Page { desc, size, page } => {
            let direction = SortDirection::from_ascending(!desc);
            print_json(&client.page_by_price(direction, size, page)?)
        }
        Commands::AvgPrice => print_json(&client.average_price_by_genre()?),
        Commands::TopAuthor => print_json(&client.author_with_most_books()?),
        Commands::Decades => print_json(&client.counts_by_decade()?),
        Commands::EnsureIndexes => print_json(&client.ensure_indexes()?),
        Commands::Indexes => print_json(&client.list_indexes()?),
        Commands::Explain { author, year } => print_json(&client.explain_query(&author, year)?),
    }
}

/// Load step: `[ {book}, ... ]`
fn load_books(client: &BookCatalogClient<MongoStore>, file: &Path) -> Result<()> {
    let content = fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;
    let books: Vec<Book> = serde_json::from_str(&content)
        .with_context(|| format!("Invalid book array in file: {}", file.display()))?;

    client
        .ensure_collection()
        .context("Failed to create the books collection")?;
    let result = client
        .insert_books(&books)
        .with_context(|| format!("Failed to insert books from {}", file.display()))?;
    print_json(&result)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_page_defaults() {
        let cli = Cli::try_parse_from(["bookstore", "page", "--desc"]).unwrap();
        match cli.command {
            Commands::Page { desc, size, page } => {
                assert!(desc);
                assert_eq!(size, 5);
                assert_eq!(page, 0);
            }
            _ => panic!("expected page"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "bookstore",
            "explain",
            "George Orwell",
            "1949",
            "--database",
            "shop",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.database.as_deref(), Some("shop"));
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
        assert!(matches!(cli.command, Commands::Explain { year: 1949, .. }));
    }

    #[test]
    fn test_missing_config_file_fails() {
        let cli = Cli::try_parse_from([
            "bookstore",
            "--uri",
            "mongodb://elsewhere:27017",
            "--config",
            "/nonexistent/bookstore.toml",
            "summary",
        ])
        .unwrap();
        assert!(load_config(&cli).is_err());
    }
}
