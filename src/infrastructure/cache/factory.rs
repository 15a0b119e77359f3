//! Exact store factory for runtime selection

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::domain::cache::ExactStore;
use crate::domain::CacheError;

use super::in_memory::{InMemoryExactStore, InMemoryStoreConfig};
use super::sqlite::{SqliteExactStore, SqliteStoreConfig};

/// Supported exact store types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExactStoreType {
    /// Durable SQLite file
    #[default]
    Sqlite,
    /// Process-local cache using moka
    InMemory,
}

impl std::fmt::Display for ExactStoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExactStoreType::Sqlite => write!(f, "sqlite"),
            ExactStoreType::InMemory => write!(f, "in_memory"),
        }
    }
}

impl std::str::FromStr for ExactStoreType {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" | "disk" => Ok(ExactStoreType::Sqlite),
            "in_memory" | "inmemory" | "memory" => Ok(ExactStoreType::InMemory),
            _ => Err(CacheError::configuration(format!(
                "Unknown exact store type: {}. Valid types: sqlite, in_memory",
                s
            ))),
        }
    }
}

/// Configuration for the exact store
#[derive(Debug, Clone, Deserialize)]
pub struct ExactStoreConfig {
    #[serde(default)]
    pub store_type: ExactStoreType,
    /// SQLite file path
    #[serde(default = "default_path")]
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
    /// Maximum capacity (in-memory only)
    #[serde(default)]
    pub max_capacity: Option<u64>,
}

fn default_path() -> PathBuf {
    SqliteStoreConfig::default().path
}

fn default_max_connections() -> u32 {
    SqliteStoreConfig::default().max_connections
}

fn default_busy_timeout_secs() -> u64 {
    SqliteStoreConfig::default().busy_timeout_secs
}

impl Default for ExactStoreConfig {
    fn default() -> Self {
        Self {
            store_type: ExactStoreType::default(),
            path: default_path(),
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout_secs(),
            max_capacity: None,
        }
    }
}

impl ExactStoreConfig {
    /// Creates a configuration for a SQLite store at `path`
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            store_type: ExactStoreType::Sqlite,
            path: path.into(),
            ..Default::default()
        }
    }

    /// Creates a configuration for an in-memory store
    pub fn in_memory() -> Self {
        Self {
            store_type: ExactStoreType::InMemory,
            ..Default::default()
        }
    }

    /// Sets the maximum capacity (in-memory only)
    pub fn with_max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = Some(capacity);
        self
    }
}

/// Factory for creating exact store instances
#[derive(Debug, Default)]
pub struct ExactStoreFactory;

impl ExactStoreFactory {
    pub fn new() -> Self {
        Self
    }

    /// Creates an exact store based on configuration
    pub async fn create(
        &self,
        config: &ExactStoreConfig,
    ) -> Result<Arc<dyn ExactStore>, CacheError> {
        match config.store_type {
            ExactStoreType::Sqlite => {
                let sqlite_config = SqliteStoreConfig::new(config.path.clone())
                    .with_max_connections(config.max_connections)
                    .with_busy_timeout(config.busy_timeout_secs);

                let store = SqliteExactStore::open(&sqlite_config).await?;
                Ok(Arc::new(store))
            }
            ExactStoreType::InMemory => {
                let mut in_memory_config = InMemoryStoreConfig::default();

                if let Some(capacity) = config.max_capacity {
                    in_memory_config = in_memory_config.with_max_capacity(capacity);
                }

                Ok(Arc::new(InMemoryExactStore::with_config(in_memory_config)))
            }
        }
    }
}
