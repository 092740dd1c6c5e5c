//! TOML configuration loading for the service.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working local setup pointed at a node on `127.0.0.1:20334`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::ScryptParams;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    /// File is not valid TOML for this schema
    #[error("config parse error: {0}")]
    ParseError(String),
}

/// Top-level service configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// HTTP listener
    #[serde(default)]
    pub server: ServerConfig,
    /// Chain node connection and transaction defaults
    #[serde(default)]
    pub ontology: OntologyConfig,
    /// Document store location
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Key-derivation cost used for newly created accounts
    #[serde(default)]
    pub scrypt: ScryptParams,
}

/// HTTP listener settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host (default: 127.0.0.1)
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port (default: 3000)
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Chain node settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OntologyConfig {
    /// REST endpoint of the node
    #[serde(default = "default_uri")]
    pub uri: String,
    /// Gas price attached to every transaction
    #[serde(default = "default_gas_price")]
    pub gas_price: u64,
    /// Initial gas limit, raised once when pre-execution reports more
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Document store settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory of the sled database
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_uri() -> String {
    "http://127.0.0.1:20334".to_string()
}

fn default_gas_price() -> u64 {
    500
}

fn default_gas_limit() -> u64 {
    20_000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/ontgate.db")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for OntologyConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            gas_price: default_gas_price(),
            gas_limit: default_gas_limit(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl ServiceConfig {
    /// Load from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load from `path` when given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Socket address string for the HTTP listener
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
