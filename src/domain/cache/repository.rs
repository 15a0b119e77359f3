//! Exact store trait definition

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CacheKey;
use crate::domain::CacheError;

#[cfg(test)]
use mockall::automock;

/// A stored payload and when it was (last) written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: CacheKey, payload: impl Into<String>) -> Self {
        Self {
            key,
            payload: payload.into(),
            created_at: Utc::now(),
        }
    }
}

/// Durable key → payload persistence
///
/// `put` is an upsert: writing an existing key replaces its payload and
/// refreshes its timestamp. Entries never expire.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ExactStore: Send + Sync {
    /// Gets the payload stored under `key`, `None` when absent
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError>;

    /// Inserts or replaces the payload stored under `key`
    async fn put(&self, key: &CacheKey, payload: &str) -> Result<(), CacheError>;

    /// Gets the full entry stored under `key`
    async fn entry(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    /// Number of stored entries
    async fn len(&self) -> Result<u64, CacheError>;

    /// Name of the backing engine, for logs
    fn backend_name(&self) -> &'static str;
}
