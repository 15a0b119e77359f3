//! Exact cache domain - request keys, payload codecs and the exact store

mod codec;
mod key;
mod repository;

pub use codec::{FnCodec, JsonCodec, PayloadCodec};
pub use key::{
    canonical_json, derive_key, CacheKey, CacheKeyDeriver, RequestMaterial, Sha256KeyDeriver,
    CACHE_KEY_LEN,
};
pub use repository::{CacheEntry, ExactStore};

#[cfg(test)]
pub use repository::MockExactStore;
