//! Semantic index factory
//!
//! Opening the persisted backend may fail at runtime; that surfaces as
//! `SemanticBackendUnavailable` so callers can continue exact-only.

use std::sync::Arc;

use crate::domain::semantic_cache::{SemanticBackend, SemanticCacheConfig, SemanticIndex};
use crate::domain::CacheError;

use super::in_memory::InMemorySemanticIndex;
use super::sqlite::SqliteSemanticIndex;

/// Factory for creating semantic index instances
#[derive(Debug, Default)]
pub struct SemanticIndexFactory;

impl SemanticIndexFactory {
    pub fn new() -> Self {
        Self
    }

    /// Creates the index described by `config`, `None` when disabled
    pub async fn create(
        &self,
        config: &SemanticCacheConfig,
    ) -> Result<Option<Arc<dyn SemanticIndex>>, CacheError> {
        if !config.enabled {
            return Ok(None);
        }

        match config.backend {
            SemanticBackend::InMemory => Ok(Some(Arc::new(InMemorySemanticIndex::new(
                config.collection.clone(),
            )))),
            SemanticBackend::Sqlite => {
                let index =
                    SqliteSemanticIndex::open(&config.persist_dir, config.collection.clone())
                        .await?;
                Ok(Some(Arc::new(index)))
            }
        }
    }
}
