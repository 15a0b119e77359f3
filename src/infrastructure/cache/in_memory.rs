//! In-memory exact store using moka

use async_trait::async_trait;
use moka::future::Cache as MokaCache;

use crate::domain::cache::{CacheEntry, CacheKey, ExactStore};
use crate::domain::CacheError;

/// Configuration for the in-memory exact store
#[derive(Debug, Clone, Default)]
pub struct InMemoryStoreConfig {
    /// Maximum number of entries, unbounded when `None`
    pub max_capacity: Option<u64>,
}

impl InMemoryStoreConfig {
    /// Sets the maximum capacity
    pub fn with_max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = Some(capacity);
        self
    }
}

/// Process-local exact store
///
/// Entries never expire; they are only evicted when a capacity is set and
/// reached. Useful for tests and for callers that do not need durability.
#[derive(Debug)]
pub struct InMemoryExactStore {
    cache: MokaCache<CacheKey, CacheEntry>,
}

impl InMemoryExactStore {
    /// Creates an unbounded store
    pub fn new() -> Self {
        Self::with_config(InMemoryStoreConfig::default())
    }

    /// Creates a store with the given configuration
    pub fn with_config(config: InMemoryStoreConfig) -> Self {
        let mut builder = MokaCache::builder();

        if let Some(capacity) = config.max_capacity {
            builder = builder.max_capacity(capacity);
        }

        Self {
            cache: builder.build(),
        }
    }
}

impl Default for InMemoryExactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExactStore for InMemoryExactStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        Ok(self.cache.get(key).await.map(|entry| entry.payload))
    }

    async fn put(&self, key: &CacheKey, payload: &str) -> Result<(), CacheError> {
        self.cache
            .insert(key.clone(), CacheEntry::new(key.clone(), payload))
            .await;
        Ok(())
    }

    async fn entry(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.cache.get(key).await)
    }

    async fn len(&self) -> Result<u64, CacheError> {
        self.cache.run_pending_tasks().await;
        Ok(self.cache.entry_count())
    }

    fn backend_name(&self) -> &'static str {
        "in_memory"
    }
}
