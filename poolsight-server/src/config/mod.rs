//! Configuration module for poolsight-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables.

pub mod file;

use crate::config::file::{FileConfig, StorageKind};
use poolsight_core::config::IndexerConfig;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Loaded configuration, with CLI overrides applied.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub listen: SocketAddr,
    pub storage: StorageKind,
    pub blocks_path: Option<PathBuf>,
    pub indexer: IndexerConfig,
}

/// CLI values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub listen: Option<SocketAddr>,
    pub blocks_path: Option<PathBuf>,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    overrides: Overrides,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, overrides: Overrides) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            overrides,
        }
    }

    /// Read the TOML file, apply CLI overrides and validate.
    ///
    /// A missing file is not an error: every section has defaults.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let file_config = match std::fs::read_to_string(&self.config_path) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = ?self.config_path, "config file not found, using defaults");
                FileConfig::default()
            }
            Err(e) => return Err(e.into()),
        };
        self.build(file_config)
    }

    fn build(&self, mut file_config: FileConfig) -> Result<LoadedConfig, ConfigError> {
        if let Some(listen) = self.overrides.listen {
            file_config.server.listen = listen;
        }
        if let Some(path) = &self.overrides.blocks_path {
            file_config.source.blocks_path = Some(path.clone());
        }

        validate(&file_config)?;

        Ok(LoadedConfig {
            listen: file_config.server.listen,
            storage: file_config.indexer.storage,
            blocks_path: file_config.source.blocks_path,
            indexer: IndexerConfig {
                outbound_timeout: time::Duration::seconds(
                    i64::try_from(file_config.indexer.outbound_timeout_secs).map_err(|_| {
                        ConfigError::ValidationError("outbound_timeout_secs is too large".into())
                    })?,
                ),
            },
        })
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    if config.indexer.outbound_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "outbound_timeout_secs must be greater than zero".into(),
        ));
    }
    Ok(())
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str, overrides: Overrides) -> Result<LoadedConfig, ConfigError> {
        let file_config: FileConfig = toml::from_str(toml_str)?;
        ConfigLoader::new("unused.toml", overrides).build(file_config)
    }

    #[test]
    fn test_cli_overrides_take_precedence() {
        let overrides = Overrides {
            listen: Some("127.0.0.1:9000".parse().unwrap()),
            blocks_path: Some(PathBuf::from("/tmp/override.jsonl")),
        };
        let loaded = parse(
            "[server]\nlisten = \"0.0.0.0:8080\"\n[source]\nblocks_path = \"a.jsonl\"\n",
            overrides,
        )
        .unwrap();
        assert_eq!(loaded.listen.port(), 9000);
        assert_eq!(loaded.blocks_path, Some(PathBuf::from("/tmp/override.jsonl")));
    }

    #[test]
    fn test_timeout_becomes_duration() {
        let loaded = parse("[indexer]\noutbound_timeout_secs = 60\n", Overrides::default()).unwrap();
        assert_eq!(loaded.indexer.outbound_timeout, time::Duration::minutes(1));
        let defaults = parse("", Overrides::default()).unwrap();
        assert_eq!(defaults.indexer, IndexerConfig::default());
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let result = parse("[indexer]\noutbound_timeout_secs = 0\n", Overrides::default());
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let loader = ConfigLoader::new("/nonexistent/poolsight.toml", Overrides::default());
        let loaded = loader.load().unwrap();
        assert_eq!(loaded.storage, StorageKind::Postgres);
        assert_eq!(loaded.listen.port(), 8080);
    }
}
