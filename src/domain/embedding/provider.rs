//! Embedding provider trait definition

use async_trait::async_trait;

use crate::domain::CacheError;

#[cfg(test)]
use mockall::automock;

/// Trait for embedding providers (local models, remote APIs, ...)
///
/// Every vector returned by one instance has `dimensions()` components.
/// Vectors are expected, not required, to be unit length.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CacheError>;

    /// Get the provider name
    fn provider_name(&self) -> &'static str;

    /// Get the embedding dimensions
    fn dimensions(&self) -> usize;
}
