//! In-memory semantic index implementation

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::embedding::cosine_similarity;
use crate::domain::semantic_cache::{SemanticIndex, SemanticMatch, SemanticRecord};
use crate::domain::CacheError;

/// In-memory semantic index using linear search
///
/// Suitable for tests and small, short-lived caches. Records are lost when
/// the process exits; use `SqliteSemanticIndex` for persistence. Records keep
/// their insertion order, and overwriting one keeps its slot, so equal
/// similarities resolve to the earliest inserted record.
#[derive(Debug)]
pub struct InMemorySemanticIndex {
    collection: String,
    records: RwLock<Records>,
}

#[derive(Debug, Default)]
struct Records {
    ordered: Vec<SemanticRecord>,
    positions: HashMap<String, usize>,
}

impl Records {
    fn upsert(&mut self, record: SemanticRecord) {
        match self.positions.get(record.id()) {
            Some(&position) => self.ordered[position] = record,
            None => {
                self.positions
                    .insert(record.id().to_string(), self.ordered.len());
                self.ordered.push(record);
            }
        }
    }
}

impl InMemorySemanticIndex {
    /// Create a new, empty index for `collection`
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            records: RwLock::new(Records::default()),
        }
    }
}

/// Picks the record most similar to `embedding`, skipping other dimensions
fn nearest<'a, I>(embedding: &[f32], records: I) -> Option<SemanticMatch>
where
    I: IntoIterator<Item = &'a SemanticRecord>,
{
    records
        .into_iter()
        .filter(|record| record.embedding().len() == embedding.len())
        .map(|record| (record, cosine_similarity(embedding, record.embedding())))
        .fold(None, |best: Option<(&SemanticRecord, f32)>, candidate| match best {
            Some((_, best_similarity)) if best_similarity >= candidate.1 => best,
            _ => Some(candidate),
        })
        .map(|(record, similarity)| SemanticMatch::from_record(record, similarity))
}

#[async_trait]
impl SemanticIndex for InMemorySemanticIndex {
    async fn query(&self, embedding: &[f32]) -> Result<Option<SemanticMatch>, CacheError> {
        let records = self.records.read().map_err(|e| {
            CacheError::storage(format!("Failed to acquire read lock: {}", e))
        })?;

        Ok(nearest(embedding, &records.ordered))
    }

    async fn upsert(&self, record: SemanticRecord) -> Result<(), CacheError> {
        let mut records = self.records.write().map_err(|e| {
            CacheError::storage(format!("Failed to acquire write lock: {}", e))
        })?;

        records.upsert(record);
        Ok(())
    }

    async fn len(&self) -> Result<u64, CacheError> {
        let records = self.records.read().map_err(|e| {
            CacheError::storage(format!("Failed to acquire read lock: {}", e))
        })?;

        Ok(records.ordered.len() as u64)
    }

    fn collection(&self) -> &str {
        &self.collection
    }
}
