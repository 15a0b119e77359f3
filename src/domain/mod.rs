pub mod cache;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod semantic_cache;

pub use cache::{
    CacheEntry, CacheKey, CacheKeyDeriver, ExactStore, JsonCodec, PayloadCodec, RequestMaterial,
    Sha256KeyDeriver,
};
pub use embedding::EmbeddingProvider;
pub use error::{CacheError, FetchError};
pub use llm::{Message, MessageRole};
pub use semantic_cache::{SemanticCacheConfig, SemanticIndex, SemanticMatch, SemanticRecord};
