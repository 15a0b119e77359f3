//! Semantic cache domain models and traits
//!
//! Provides vector-based lookup that matches semantically similar queries
//! rather than requiring exact key matches.

mod config;
mod repository;

pub use config::{DEFAULT_SIMILARITY_THRESHOLD, SemanticBackend, SemanticCacheConfig};
pub use repository::{record_id, SemanticIndex, SemanticMatch, SemanticRecord};

#[cfg(test)]
pub use repository::MockSemanticIndex;
