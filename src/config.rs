//! Configuration
//!
//! Loaded from a YAML file; every field has a default, so an empty file (or
//! no file at all) is a valid configuration:
//!
//! ```yaml
//! store:
//!   kind: http
//!   address: localhost:8000
//!   database: cti
//!   username: admin
//!   password: password
//! batch_size: 50
//! concurrency: 16
//! ```

use crate::engine::ExecOptions;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which store implementation to run against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Http,
    Memory,
}

/// Connection settings for the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    pub address: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Http,
            address: "localhost:8000".to_string(),
            database: "cti".to_string(),
            username: "admin".to_string(),
            password: "password".to_string(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    /// Statement groups per transaction
    pub batch_size: usize,
    /// Maximum simultaneously open write transactions
    pub concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            batch_size: 50,
            concurrency: 16,
        }
    }
}

impl Config {
    /// Load and validate a configuration file
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| Error::FileReadError {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::parse(&content)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config {
                message: "batch_size must be at least 1".to_string(),
            });
        }
        if self.concurrency == 0 {
            return Err(Error::Config {
                message: "concurrency must be at least 1".to_string(),
            });
        }
        if self.store.kind == StoreKind::Http && self.store.address.trim().is_empty() {
            return Err(Error::Config {
                message: "store address is empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn exec_options(&self) -> ExecOptions {
        ExecOptions {
            batch_size: self.batch_size,
            concurrency: self.concurrency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.store.address, "localhost:8000");
        assert_eq!(config.store.database, "cti");
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.concurrency, 16);
        assert_eq!(config.store.kind, StoreKind::Http);
    }

    #[test]
    fn test_partial_override() {
        let config = Config::parse("store:\n  kind: memory\n  database: test\nbatch_size: 5\n").unwrap();
        assert_eq!(config.store.kind, StoreKind::Memory);
        assert_eq!(config.store.database, "test");
        assert_eq!(config.store.username, "admin");
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.concurrency, 16);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(Config::parse("batch_size: 0"), Err(Error::Config { .. })));
        assert!(matches!(Config::parse("concurrency: 0"), Err(Error::Config { .. })));
        assert!(matches!(Config::parse("batch_size: [1"), Err(Error::YamlParseError { .. })));
    }

    #[tokio::test]
    async fn test_load_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ctimap.yaml");
        std::fs::write(&path, "concurrency: 4\n").unwrap();
        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.concurrency, 4);

        let missing = Config::load(&tmp.path().join("missing.yaml")).await;
        assert!(matches!(missing, Err(Error::FileReadError { .. })));
    }
}
