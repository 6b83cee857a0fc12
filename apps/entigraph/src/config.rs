//! # CLI Configuration
//!
//! Optional TOML file passed with `--config`:
//!
//! ```toml
//! database = "graph.redb"
//!
//! [store]
//! lock_timeout_ms = 2000
//! default_items_per_page = 20
//! max_items_per_page = 500
//! ```
//!
//! Command-line flags take precedence over the file.

use entigraph_core::{GraphError, StoreConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Database used when neither the flag nor the file names one.
pub const DEFAULT_DATABASE: &str = "entigraph.redb";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub database: Option<PathBuf>,
    pub store: StoreConfig,
}

impl AppConfig {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, GraphError> {
        toml::from_str(text).map_err(|e| GraphError::InvalidInput(format!("config: {}", e)))
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self, GraphError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            GraphError::StorageIo(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// The database path: flag, then file, then the default.
    #[must_use]
    pub fn resolve_database(&self, flag: Option<&Path>) -> PathBuf {
        flag.map(Path::to_path_buf)
            .or_else(|| self.database.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_file() {
        let config = AppConfig::from_toml(
            r#"
            database = "graph.redb"

            [store]
            lock_timeout_ms = 250
            default_items_per_page = 20
            "#,
        )
        .expect("parse");

        assert_eq!(config.database, Some(PathBuf::from("graph.redb")));
        assert_eq!(config.store.lock_timeout_ms, 250);
        assert_eq!(config.store.default_items_per_page, 20);
        assert_eq!(config.store.max_items_per_page, 1000);
    }

    #[test]
    fn empty_file_is_default() {
        assert_eq!(AppConfig::from_toml("").expect("parse"), AppConfig::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = AppConfig::from_toml("databse = \"typo.redb\"");
        assert!(matches!(result, Err(GraphError::InvalidInput(_))));
    }

    #[test]
    fn flag_overrides_file() {
        let config = AppConfig {
            database: Some(PathBuf::from("file.redb")),
            ..AppConfig::default()
        };
        assert_eq!(
            config.resolve_database(Some(Path::new("flag.redb"))),
            PathBuf::from("flag.redb")
        );
        assert_eq!(config.resolve_database(None), PathBuf::from("file.redb"));
        assert_eq!(
            AppConfig::default().resolve_database(None),
            PathBuf::from(DEFAULT_DATABASE)
        );
    }
}
