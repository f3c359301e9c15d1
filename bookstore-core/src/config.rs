// bookstore-core/src/config.rs
//! Connection configuration
//!
//! Resolution order:
//! 1. explicit path (CLI `--config`)
//! 2. `$BOOKSTORE_CONFIG`
//! 3. `bookstore.toml` in the working directory, if present
//! 4. built-in defaults
//!
//! `BOOKSTORE_*` environment variables are applied on top of whichever
//! source won.

use crate::error::{CatalogError, Result};
use crate::logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const CONFIG_ENV: &str = "BOOKSTORE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "bookstore.toml";

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// MongoDB connection string
    pub uri: String,
    pub database: String,
    pub collection: String,
    /// Budget per round trip, milliseconds
    pub timeout_ms: u64,
    pub app_name: String,
    pub log_level: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            uri: "mongodb://localhost:27017".to_string(),
            database: "plp_bookstore".to_string(),
            collection: "books".to_string(),
            timeout_ms: 10_000,
            app_name: "bookstore".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

impl CatalogConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: CatalogConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CatalogError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load following the resolution order, then apply environment overrides
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok();
        let mut config = match resolve_path(explicit, env) {
            Some(path) => {
                debug!("loading configuration from {}", path.display());
                Self::from_file(&path)?
            }
            None => {
                warn!("no configuration file found, using defaults");
                Self::default()
            }
        };
        config.apply_overrides(env)?;
        Ok(config)
    }

    /// Apply `BOOKSTORE_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(uri) = lookup("BOOKSTORE_URI") {
            self.uri = uri;
        }
        if let Some(database) = lookup("BOOKSTORE_DATABASE") {
            self.database = database;
        }
        if let Some(collection) = lookup("BOOKSTORE_COLLECTION") {
            self.collection = collection;
        }
        if let Some(timeout) = lookup("BOOKSTORE_TIMEOUT_MS") {
            self.timeout_ms = timeout.trim().parse().map_err(|_| {
                CatalogError::Config(format!("BOOKSTORE_TIMEOUT_MS is not a number: '{}'", timeout))
            })?;
        }
        if let Some(level) = lookup("BOOKSTORE_LOG_LEVEL") {
            self.log_level = level;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("uri", &self.uri),
            ("database", &self.database),
            ("collection", &self.collection),
        ] {
            if value.trim().is_empty() {
                return Err(CatalogError::Config(format!("{} must not be empty", key)));
            }
        }
        if self.timeout_ms == 0 {
            return Err(CatalogError::Config("timeout_ms must be positive".to_string()));
        }
        self.level()?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn level(&self) -> Result<LogLevel> {
        self.log_level
            .parse()
            .map_err(|_| CatalogError::Config(format!("unknown log level: '{}'", self.log_level)))
    }
}

/// Pick the config file to read, if any
fn resolve_path<F>(explicit: Option<&Path>, lookup: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = lookup(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    local.exists().then_some(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = CatalogConfig::from_toml_str("database = \"shop\"\ntimeout_ms = 250\n").unwrap();
        assert_eq!(config.database, "shop");
        assert_eq!(config.timeout(), Duration::from_millis(250));
        assert_eq!(config.collection, "books");
        assert_eq!(config.uri, "mongodb://localhost:27017");
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "uri = \"mongodb://db.internal:27017\"").unwrap();
        writeln!(file, "log_level = \"DEBUG\"").unwrap();
        let config = CatalogConfig::from_file(file.path()).unwrap();
        assert_eq!(config.uri, "mongodb://db.internal:27017");
        assert_eq!(config.level().unwrap(), LogLevel::Debug);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CatalogConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, CatalogError::Config(_)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(CatalogConfig::from_toml_str("timeout_ms = 0").is_err());
        assert!(CatalogConfig::from_toml_str("database = \"\"").is_err());
        assert!(CatalogConfig::from_toml_str("log_level = \"loud\"").is_err());
        assert!(CatalogConfig::from_toml_str("timeout_ms = \"soon\"").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = CatalogConfig::default();
        config
            .apply_overrides(env(&[
                ("BOOKSTORE_URI", "mongodb://other:27018"),
                ("BOOKSTORE_TIMEOUT_MS", "1500"),
            ]))
            .unwrap();
        assert_eq!(config.uri, "mongodb://other:27018");
        assert_eq!(config.timeout_ms, 1500);
        assert_eq!(config.database, "plp_bookstore");

        let err = config
            .apply_overrides(env(&[("BOOKSTORE_TIMEOUT_MS", "fast")]))
            .unwrap_err();
        assert!(matches!(err, CatalogError::Config(_)));
    }

    #[test]
    fn test_resolution_order() {
        let explicit = Path::new("/etc/explicit.toml");
        let lookup = env(&[(CONFIG_ENV, "/etc/from-env.toml")]);
        assert_eq!(resolve_path(Some(explicit), &lookup), Some(explicit.to_path_buf()));
        assert_eq!(resolve_path(None, &lookup), Some(PathBuf::from("/etc/from-env.toml")));
    }
}
