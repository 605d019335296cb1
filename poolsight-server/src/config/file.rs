//! TOML file configuration structures.
//!
//! These structs directly map to the `poolsight.toml` file format.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub indexer: IndexerSection,
    #[serde(default)]
    pub source: SourceConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// Where committed state and event rows go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Postgres,
    Memory,
}

/// Indexer configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerSection {
    /// How long an outbound may trail the swap or withdraw it pays out.
    #[serde(default = "default_outbound_timeout_secs")]
    pub outbound_timeout_secs: u64,
    #[serde(default)]
    pub storage: StorageKind,
}

impl Default for IndexerSection {
    fn default() -> Self {
        Self {
            outbound_timeout_secs: default_outbound_timeout_secs(),
            storage: StorageKind::default(),
        }
    }
}

fn default_outbound_timeout_secs() -> u64 {
    48 * 60 * 60
}

/// Block source section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    /// JSON-lines file with one block per line.
    #[serde(default)]
    pub blocks_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_parsing() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"

[indexer]
outbound_timeout_secs = 3600
storage = "memory"

[source]
blocks_path = "./blocks.jsonl"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.indexer.outbound_timeout_secs, 3600);
        assert_eq!(config.indexer.storage, StorageKind::Memory);
        assert_eq!(
            config.source.blocks_path,
            Some(PathBuf::from("./blocks.jsonl"))
        );
    }

    #[test]
    fn test_defaults_apply_to_missing_sections() {
        let config: FileConfig = toml::from_str("[server]\n").unwrap();
        assert_eq!(config.server.listen, default_listen_addr());
        assert_eq!(config.indexer.outbound_timeout_secs, 172_800);
        assert_eq!(config.indexer.storage, StorageKind::Postgres);
        assert!(config.source.blocks_path.is_none());
    }

    #[test]
    fn test_unknown_storage_is_rejected() {
        let result: Result<FileConfig, _> = toml::from_str("[indexer]\nstorage = \"sqlite\"\n");
        assert!(result.is_err());
    }
}
