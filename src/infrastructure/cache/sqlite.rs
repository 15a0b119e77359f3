//! SQLite exact store with connection pooling

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info};

use crate::domain::cache::{CacheEntry, CacheKey, ExactStore};
use crate::domain::CacheError;

const TABLE_NAME: &str = "llm_cache";

/// SQLite exact store configuration
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// Database file, created with its parent directory if absent
    pub path: PathBuf,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// How long a writer waits on a locked database, in seconds
    pub busy_timeout_secs: u64,
}

impl Default for SqliteStoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./.cache/llm_cache.sqlite"),
            max_connections: 4,
            busy_timeout_secs: 5,
        }
    }
}

impl SqliteStoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_busy_timeout(mut self, secs: u64) -> Self {
        self.busy_timeout_secs = secs;
        self
    }
}

/// Opens a pooled SQLite database, creating the file and its directory
pub(crate) async fn connect_sqlite(
    path: &Path,
    max_connections: u32,
    busy_timeout_secs: u64,
) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(busy_timeout_secs));

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
}

pub(crate) fn to_unix_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp_micros() as f64 / 1_000_000.0
}

pub(crate) fn from_unix_seconds(seconds: f64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros((seconds * 1_000_000.0).round() as i64).unwrap_or_default()
}

/// Durable exact store backed by a single SQLite table
///
/// Schema: `llm_cache(key TEXT PRIMARY KEY, payload TEXT, created_at REAL)`.
/// Several processes may open the same file; SQLite's own locking provides
/// single-row atomicity and nothing more is layered on top.
pub struct SqliteExactStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl Debug for SqliteExactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteExactStore")
            .field("path", &self.path)
            .finish()
    }
}

impl SqliteExactStore {
    /// Opens (and if needed creates) the store described by `config`
    pub async fn open(config: &SqliteStoreConfig) -> Result<Self, CacheError> {
        let pool = connect_sqlite(&config.path, config.max_connections, config.busy_timeout_secs)
            .await
            .map_err(|e| {
                CacheError::storage(format!(
                    "Failed to open exact store at {}: {}",
                    config.path.display(),
                    e
                ))
            })?;

        let store = Self {
            pool,
            path: config.path.clone(),
        };
        store.ensure_schema().await?;

        info!(path = %config.path.display(), "Exact store ready");
        Ok(store)
    }

    /// Opens the store at `path` with default pool settings
    pub async fn open_path(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        Self::open(&SqliteStoreConfig::new(path)).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_schema(&self) -> Result<(), CacheError> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                created_at REAL NOT NULL
            )
            "#,
            TABLE_NAME
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| CacheError::storage(format!("Failed to create exact store table: {}", e)))?;

        Ok(())
    }

    /// Closes the pool, waiting for connections to be returned
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ExactStore for SqliteExactStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        let payload: Option<String> =
            sqlx::query_scalar(&format!("SELECT payload FROM {} WHERE key = ?1", TABLE_NAME))
                .bind(key.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| CacheError::storage(format!("Failed to read cache entry: {}", e)))?;

        Ok(payload)
    }

    async fn put(&self, key: &CacheKey, payload: &str) -> Result<(), CacheError> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {} (key, payload, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                payload = excluded.payload,
                created_at = excluded.created_at
            "#,
            TABLE_NAME
        ))
        .bind(key.as_str())
        .bind(payload)
        .bind(to_unix_seconds(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| CacheError::storage(format!("Failed to write cache entry: {}", e)))?;

        debug!(key = %key, "Stored exact cache entry");
        Ok(())
    }

    async fn entry(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let row = sqlx::query(&format!(
            "SELECT payload, created_at FROM {} WHERE key = ?1",
            TABLE_NAME
        ))
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CacheError::storage(format!("Failed to read cache entry: {}", e)))?;

        row.map(|row| {
            let payload: String = row
                .try_get("payload")
                .map_err(|e| CacheError::storage(format!("Malformed cache row: {}", e)))?;
            let created_at: f64 = row
                .try_get("created_at")
                .map_err(|e| CacheError::storage(format!("Malformed cache row: {}", e)))?;

            Ok(CacheEntry {
                key: key.clone(),
                payload,
                created_at: from_unix_seconds(created_at),
            })
        })
        .transpose()
    }

    async fn len(&self) -> Result<u64, CacheError> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", TABLE_NAME))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CacheError::storage(format!("Failed to count cache entries: {}", e)))?;

        Ok(count.max(0) as u64)
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
