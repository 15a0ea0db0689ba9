//! Durable backing store for the response cache

use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// SQL schema for the cache database
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS psi_cache (
    fingerprint TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_psi_cache_expires ON psi_cache(expires_at);
"#;

/// Errors raised by a cache store
#[derive(Debug, Error)]
pub enum CacheStoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CacheStoreResult<T> = Result<T, CacheStoreError>;

/// One persisted cache entry, timestamps in RFC 3339
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub fingerprint: String,
    pub value: String,
    pub created_at: String,
    pub expires_at: String,
}

/// Storage backend for cache snapshots
pub trait CacheStore: Send + Sync {
    /// Reads every stored record
    fn load(&self) -> CacheStoreResult<Vec<StoredRecord>>;

    /// Replaces the stored snapshot with `records`
    fn save(&self, records: &[StoredRecord]) -> CacheStoreResult<()>;
}

/// SQLite-backed cache store
///
/// A connection is opened per operation; load and save happen once per batch.
#[derive(Debug, Clone)]
pub struct SqliteCacheStore {
    path: PathBuf,
}

impl SqliteCacheStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> CacheStoreResult<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&self.path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(conn)
    }
}

impl CacheStore for SqliteCacheStore {
    fn load(&self) -> CacheStoreResult<Vec<StoredRecord>> {
        let conn = self.open()?;
        let mut stmt =
            conn.prepare("SELECT fingerprint, value, created_at, expires_at FROM psi_cache")?;

        let records = stmt
            .query_map([], |row| {
                Ok(StoredRecord {
                    fingerprint: row.get(0)?,
                    value: row.get(1)?,
                    created_at: row.get(2)?,
                    expires_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn save(&self, records: &[StoredRecord]) -> CacheStoreResult<()> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM psi_cache", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO psi_cache (fingerprint, value, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for record in records {
                stmt.execute(params![
                    record.fingerprint,
                    record.value,
                    record.created_at,
                    record.expires_at
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
