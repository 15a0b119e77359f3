//! Semantic index trait and types

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::domain::CacheError;

#[cfg(test)]
use mockall::automock;

type HmacSha256 = Hmac<Sha256>;

/// Stable record id for `document_text` within `collection`
///
/// HMAC-SHA256 keyed by the collection name, hex encoded. Identical text
/// always maps to the same record.
pub fn record_id(collection: &str, document_text: &str) -> Result<String, CacheError> {
    let mut mac = HmacSha256::new_from_slice(collection.as_bytes()).map_err(|e| {
        CacheError::invalid_request(format!("Invalid collection key '{}': {}", collection, e))
    })?;
    mac.update(document_text.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// A record stored in the semantic index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticRecord {
    id: String,
    embedding: Vec<f32>,
    document_text: String,
    payload: String,
}

impl SemanticRecord {
    /// Create a record whose id is derived from the document text
    pub fn new(
        collection: &str,
        embedding: Vec<f32>,
        document_text: impl Into<String>,
        payload: impl Into<String>,
    ) -> Result<Self, CacheError> {
        let document_text = document_text.into();

        Ok(Self {
            id: record_id(collection, &document_text)?,
            embedding,
            document_text,
            payload: payload.into(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }

    pub fn document_text(&self) -> &str {
        &self.document_text
    }

    /// Serialized payload carried as metadata
    pub fn payload(&self) -> &str {
        &self.payload
    }
}

/// Nearest neighbor returned by a semantic query
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticMatch {
    pub id: String,
    /// Cosine similarity, i.e. `1 - cosine distance`
    pub similarity: f32,
    pub document_text: String,
    pub payload: String,
}

impl SemanticMatch {
    pub fn from_record(record: &SemanticRecord, similarity: f32) -> Self {
        Self {
            id: record.id.clone(),
            similarity,
            document_text: record.document_text.clone(),
            payload: record.payload.clone(),
        }
    }
}

/// Approximate nearest-neighbor store over embeddings
///
/// Backends must return the globally nearest record under cosine similarity;
/// ties are resolved by the backend.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Top-1 nearest record to `embedding`, `None` when the index is empty
    async fn query(&self, embedding: &[f32]) -> Result<Option<SemanticMatch>, CacheError>;

    /// Insert or overwrite (by id) a record
    async fn upsert(&self, record: SemanticRecord) -> Result<(), CacheError>;

    /// Number of records
    async fn len(&self) -> Result<u64, CacheError>;

    /// Collection name records are keyed by
    fn collection(&self) -> &str;
}
