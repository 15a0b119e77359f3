//! PMP LLM Cache
//!
//! Two-tier response cache for LLM calls:
//! - Exact tier: SHA-256 key over the canonical request, stored in SQLite
//! - Semantic tier: nearest-neighbor lookup over embeddings of the last user turn
//!
//! `CacheOrchestrator::fetch` consults both tiers before calling the supplied
//! compute function, promotes semantic hits into the exact tier and writes
//! fresh results back to both.

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use crate::config::CacheSettings;
pub use domain::{
    CacheError, CacheKey, CacheKeyDeriver, EmbeddingProvider, ExactStore, FetchError, JsonCodec,
    Message, MessageRole, PayloadCodec, RequestMaterial, SemanticIndex, SemanticMatch,
    SemanticRecord, Sha256KeyDeriver,
};
pub use infrastructure::services::{
    CacheOrchestrator, CacheSource, CacheStats, CacheWarning, FetchOptions, Fetched,
};
