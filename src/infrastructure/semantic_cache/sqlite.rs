//! Persisted semantic index stored in a SQLite database

use std::fmt::Debug;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::{debug, info};

use crate::domain::embedding::cosine_similarity;
use crate::domain::semantic_cache::{SemanticIndex, SemanticMatch, SemanticRecord};
use crate::domain::CacheError;
use crate::infrastructure::cache::{connect_sqlite, to_unix_seconds};

/// Database file created inside the persistence directory
pub const INDEX_FILE_NAME: &str = "semantic.sqlite";

/// The only similarity space supported by this index
const COSINE_SPACE: &str = "cosine";

/// Vector collection persisted under a directory
///
/// Each collection is registered with its similarity space (`cosine`) and the
/// dimensionality fixed by its first record. Queries scan the collection and
/// return the globally nearest record; equal similarities resolve to the
/// earliest inserted record.
pub struct SqliteSemanticIndex {
    pool: SqlitePool,
    collection: String,
    persist_dir: PathBuf,
}

impl Debug for SqliteSemanticIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSemanticIndex")
            .field("persist_dir", &self.persist_dir)
            .field("collection", &self.collection)
            .finish()
    }
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>, CacheError> {
    if bytes.len() % 4 != 0 {
        return Err(CacheError::storage(format!(
            "Stored embedding has {} bytes, not a multiple of 4",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

impl SqliteSemanticIndex {
    /// Opens the collection stored under `persist_dir`, creating it if needed
    ///
    /// Fails with `SemanticBackendUnavailable` when the directory or database
    /// cannot be brought up, so callers can fall back to exact-only caching.
    pub async fn open(
        persist_dir: impl AsRef<Path>,
        collection: impl Into<String>,
    ) -> Result<Self, CacheError> {
        let persist_dir = persist_dir.as_ref().to_path_buf();
        let collection = collection.into();

        tokio::fs::create_dir_all(&persist_dir).await.map_err(|e| {
            CacheError::semantic_backend(format!(
                "Cannot create semantic index directory {}: {}",
                persist_dir.display(),
                e
            ))
        })?;

        let pool = connect_sqlite(&persist_dir.join(INDEX_FILE_NAME), 4, 5)
            .await
            .map_err(|e| {
                CacheError::semantic_backend(format!(
                    "Cannot open semantic index in {}: {}",
                    persist_dir.display(),
                    e
                ))
            })?;

        let index = Self {
            pool,
            collection,
            persist_dir,
        };
        index.ensure_schema().await?;
        index.register_collection().await?;

        info!(
            dir = %index.persist_dir.display(),
            collection = %index.collection,
            "Semantic index ready"
        );
        Ok(index)
    }

    pub fn persist_dir(&self) -> &Path {
        &self.persist_dir
    }

    async fn ensure_schema(&self) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS semantic_collections (
                name TEXT PRIMARY KEY,
                space TEXT NOT NULL,
                dimensions INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CacheError::semantic_backend(format!("Failed to create collections table: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS semantic_records (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                embedding BLOB NOT NULL,
                document TEXT NOT NULL,
                payload TEXT NOT NULL,
                updated_at REAL NOT NULL,
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CacheError::semantic_backend(format!("Failed to create records table: {}", e)))?;

        Ok(())
    }

    async fn register_collection(&self) -> Result<(), CacheError> {
        sqlx::query("INSERT OR IGNORE INTO semantic_collections (name, space) VALUES (?1, ?2)")
            .bind(&self.collection)
            .bind(COSINE_SPACE)
            .execute(&self.pool)
            .await
            .map_err(|e| CacheError::semantic_backend(format!("Failed to register collection: {}", e)))?;

        let space: String =
            sqlx::query_scalar("SELECT space FROM semantic_collections WHERE name = ?1")
                .bind(&self.collection)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| CacheError::semantic_backend(format!("Failed to read collection: {}", e)))?;

        if space != COSINE_SPACE {
            return Err(CacheError::semantic_backend(format!(
                "Collection '{}' uses '{}' space, expected '{}'",
                self.collection, space, COSINE_SPACE
            )));
        }

        Ok(())
    }

    /// Fixes the collection dimensionality on first use and checks it after
    async fn check_dimensions(&self, dimensions: usize) -> Result<(), CacheError> {
        sqlx::query(
            "UPDATE semantic_collections SET dimensions = ?2 WHERE name = ?1 AND dimensions IS NULL",
        )
        .bind(&self.collection)
        .bind(dimensions as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| CacheError::storage(format!("Failed to record dimensions: {}", e)))?;

        let stored: Option<i64> =
            sqlx::query_scalar("SELECT dimensions FROM semantic_collections WHERE name = ?1")
                .bind(&self.collection)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| CacheError::storage(format!("Failed to read dimensions: {}", e)))?;

        match stored {
            Some(stored) if stored as usize != dimensions => Err(CacheError::storage(format!(
                "Collection '{}' holds {}-dimensional embeddings, got {}",
                self.collection, stored, dimensions
            ))),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl SemanticIndex for SqliteSemanticIndex {
    async fn query(&self, embedding: &[f32]) -> Result<Option<SemanticMatch>, CacheError> {
        let mut rows = sqlx::query(
            "SELECT id, embedding, document, payload FROM semantic_records \
             WHERE collection = ?1 ORDER BY rowid",
        )
        .bind(&self.collection)
        .fetch(&self.pool);

        let mut best: Option<SemanticMatch> = None;

        while let Some(row) = rows
            .try_next()
            .await
            .map_err(|e| CacheError::storage(format!("Failed to scan semantic index: {}", e)))?
        {
            let bytes: Vec<u8> = row
                .try_get("embedding")
                .map_err(|e| CacheError::storage(format!("Malformed semantic row: {}", e)))?;
            let stored = decode_embedding(&bytes)?;

            if stored.len() != embedding.len() {
                continue;
            }

            let similarity = cosine_similarity(embedding, &stored);

            if best.as_ref().is_some_and(|b| b.similarity >= similarity) {
                continue;
            }

            best = Some(SemanticMatch {
                id: row
                    .try_get("id")
                    .map_err(|e| CacheError::storage(format!("Malformed semantic row: {}", e)))?,
                similarity,
                document_text: row
                    .try_get("document")
                    .map_err(|e| CacheError::storage(format!("Malformed semantic row: {}", e)))?,
                payload: row
                    .try_get("payload")
                    .map_err(|e| CacheError::storage(format!("Malformed semantic row: {}", e)))?,
            });
        }

        Ok(best)
    }

    async fn upsert(&self, record: SemanticRecord) -> Result<(), CacheError> {
        self.check_dimensions(record.embedding().len()).await?;

        sqlx::query(
            r#"
            INSERT INTO semantic_records (collection, id, embedding, document, payload, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(collection, id) DO UPDATE SET
                embedding = excluded.embedding,
                document = excluded.document,
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&self.collection)
        .bind(record.id())
        .bind(encode_embedding(record.embedding()))
        .bind(record.document_text())
        .bind(record.payload())
        .bind(to_unix_seconds(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| CacheError::storage(format!("Failed to upsert semantic record: {}", e)))?;

        debug!(id = %record.id(), collection = %self.collection, "Upserted semantic record");
        Ok(())
    }

    async fn len(&self) -> Result<u64, CacheError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM semantic_records WHERE collection = ?1")
                .bind(&self.collection)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| CacheError::storage(format!("Failed to count semantic records: {}", e)))?;

        Ok(count.max(0) as u64)
    }

    fn collection(&self) -> &str {
        &self.collection
    }
}
