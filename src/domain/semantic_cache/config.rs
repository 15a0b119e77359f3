//! Semantic cache configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Similarity at or above which a semantic neighbor counts as a hit
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.86;

/// Semantic index backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticBackend {
    /// Persisted collection under `persist_dir`
    #[default]
    Sqlite,
    /// Process-local, lost on exit
    InMemory,
}

impl std::fmt::Display for SemanticBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SemanticBackend::Sqlite => write!(f, "sqlite"),
            SemanticBackend::InMemory => write!(f, "in_memory"),
        }
    }
}

/// Configuration for semantic caching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticCacheConfig {
    /// Whether semantic caching is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Backend holding the vector collection
    #[serde(default)]
    pub backend: SemanticBackend,

    /// Similarity threshold for cache hits (0.0 to 1.0)
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Directory of the persisted collection
    #[serde(default = "default_persist_dir")]
    pub persist_dir: PathBuf,

    /// Collection name, also the key for record ids
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_enabled() -> bool {
    true
}

fn default_similarity_threshold() -> f32 {
    DEFAULT_SIMILARITY_THRESHOLD
}

fn default_persist_dir() -> PathBuf {
    PathBuf::from("./.cache/semantic")
}

fn default_collection() -> String {
    "request_cache".to_string()
}

impl Default for SemanticCacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            backend: SemanticBackend::default(),
            similarity_threshold: default_similarity_threshold(),
            persist_dir: default_persist_dir(),
            collection: default_collection(),
        }
    }
}

impl SemanticCacheConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether caching is enabled
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the backend
    pub fn with_backend(mut self, backend: SemanticBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Set the similarity threshold
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set the persistence directory
    pub fn with_persist_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.persist_dir = dir.into();
        self
    }

    /// Set the collection name
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }
}
