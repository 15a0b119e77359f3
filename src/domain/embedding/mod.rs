//! Embedding provider domain models and traits

mod provider;
mod vector;

pub use provider::EmbeddingProvider;
pub use vector::{cosine_distance, cosine_similarity, l2_normalize};

#[cfg(test)]
pub use provider::MockEmbeddingProvider;
#[cfg(test)]
pub use provider::fixed::FixedEmbeddingProvider;
