//! Local feature-hashing embedding provider

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::domain::embedding::{l2_normalize, EmbeddingProvider};
use crate::domain::CacheError;

pub const DEFAULT_HASHING_DIMENSIONS: usize = 384;

/// Deterministic embedding built from hashed text features
///
/// Lowercased words and the character trigrams of each word (padded with
/// `#`) are hashed into `dimensions` signed buckets and the result is scaled
/// to unit length. Texts sharing vocabulary land close together, which is
/// enough to catch rephrasings that differ by a few words. Needs no model
/// download and no network.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimensions: usize,
}

impl HashingEmbeddingProvider {
    pub fn new(dimensions: usize) -> Result<Self, CacheError> {
        if dimensions == 0 {
            return Err(CacheError::configuration(
                "Hashing embedding dimensions must be positive",
            ));
        }

        Ok(Self { dimensions })
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut index = [0u8; 8];
        index.copy_from_slice(&digest[..8]);

        let bucket = (u64::from_le_bytes(index) % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (bucket, sign)
    }

    fn features(text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let mut features = Vec::new();

        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            features.push(format!("w:{}", word));

            let padded: Vec<char> = format!("#{}#", word).chars().collect();
            for window in padded.windows(3) {
                features.push(format!("c:{}", window.iter().collect::<String>()));
            }
        }

        features
    }

    /// Embeds synchronously; the async trait method delegates here
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for feature in Self::features(text) {
            let (bucket, sign) = self.bucket(&feature);
            vector[bucket] += sign;
        }

        l2_normalize(&mut vector);
        vector
    }
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_HASHING_DIMENSIONS,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CacheError> {
        Ok(self.embed_text(text))
    }

    fn provider_name(&self) -> &'static str {
        "hashing"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
