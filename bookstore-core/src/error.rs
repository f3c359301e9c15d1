// bookstore-core/src/error.rs
//! Error types for the bookstore catalog

use std::time::Duration;
use thiserror::Error;

/// Catalog error
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Store unreachable (server selection, DNS, socket I/O)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Argument rejected before any query was dispatched
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Round trip exceeded the configured budget
    #[error("Operation '{operation}' timed out after {}ms", timeout.as_millis())]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    /// Caller asked for a match and none was found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Error reported by the store itself, diagnostic text kept verbatim
    #[error("Store error: {0}")]
    Store(String),

    /// Document could not be mapped to or from the typed model
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration could not be read or is invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CatalogError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        CatalogError::InvalidArgument(msg.into())
    }

    pub(crate) fn store(msg: impl Into<String>) -> Self {
        CatalogError::Store(msg.into())
    }

    /// True for errors raised before the store was contacted
    pub fn is_client_side(&self) -> bool {
        matches!(
            self,
            CatalogError::InvalidArgument(_) | CatalogError::Config(_)
        )
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for CatalogError {
    fn from(err: toml::de::Error) -> Self {
        CatalogError::Config(err.to_string())
    }
}

/// Socket-level I/O failures mean the store is unreachable
impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        CatalogError::Connection(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, CatalogError>;
