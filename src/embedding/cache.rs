//! On-disk embedding memo backed by SQLite
//!
//! Entries are keyed by model name and the exact input text. The BLAKE3 hash
//! of the text is only the lookup key; the stored text is compared on read so
//! a hash collision can never return the wrong vector.

use crate::error::{LoreError, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

/// Cache connection pool
pub type CachePool = Pool<SqliteConnectionManager>;

/// Persistent text -> vector cache
pub struct EmbeddingCache {
    pool: CachePool,
}

impl EmbeddingCache {
    /// Open (or create) a cache database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LoreError::Io {
                source: e,
                context: format!("Failed to create cache directory: {:?}", parent),
            })?;
        }

        // Probe with a plain connection first; the pool retries failed
        // connections until its timeout instead of failing fast
        {
            let conn = rusqlite::Connection::open(path)?;
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
        }

        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| conn.execute_batch("PRAGMA busy_timeout = 5000;"));
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| anyhow::anyhow!("Failed to create cache connection pool: {}", e))?;

        let cache = Self { pool };
        cache.migrate()?;

        Ok(cache)
    }

    fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| anyhow::anyhow!("Failed to get cache connection: {}", e).into())
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::debug!("Applying cache migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Look up vectors for `texts`, `None` for every miss
    ///
    /// Rows whose stored text or vector length does not match are misses.
    pub fn get_many(&self, model: &str, texts: &[&str]) -> Result<Vec<Option<Vec<f32>>>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT text, dimension, vector FROM embeddings WHERE model = ?1 AND text_hash = ?2",
        )?;

        let mut found = Vec::with_capacity(texts.len());
        for text in texts {
            let row: Option<(String, i64, Vec<u8>)> = stmt
                .query_row(params![model, text_key(text)], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })
                .optional()?;

            found.push(row.and_then(|(stored, dimension, blob)| {
                if stored != *text || blob.len() != dimension as usize * 4 {
                    return None;
                }
                Some(decode_vector(&blob))
            }));
        }

        Ok(found)
    }

    /// Store vectors, replacing any previous entry for the same text
    pub fn put_many(&self, model: &str, entries: &[(&str, &[f32])]) -> Result<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO embeddings
                    (model, text_hash, text, dimension, vector, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))",
            )?;
            for (text, vector) in entries {
                stmt.execute(params![
                    model,
                    text_key(text),
                    text,
                    vector.len() as i64,
                    encode_vector(vector)
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Number of cached vectors across all models
    pub fn len(&self) -> Result<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn text_key(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Cache migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    CREATE TABLE embeddings (
        model TEXT NOT NULL,
        text_hash TEXT NOT NULL,
        text TEXT NOT NULL,
        dimension INTEGER NOT NULL,
        vector BLOB NOT NULL,
        created_at TEXT NOT NULL,
        PRIMARY KEY (model, text_hash)
    );
    "#,
];

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cache_creation() {
        let temp = TempDir::new().unwrap();
        let cache = EmbeddingCache::open(&temp.path().join("cache/embeddings.sqlite")).unwrap();
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn test_put_and_get() {
        let temp = TempDir::new().unwrap();
        let cache = EmbeddingCache::open(&temp.path().join("embeddings.sqlite")).unwrap();

        let vector = vec![0.25, -0.5, 1.0];
        cache
            .put_many("mock", &[("the tower", vector.as_slice())])
            .unwrap();

        let found = cache.get_many("mock", &["the tower", "the moat"]).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].as_deref(), Some(vector.as_slice()));
        assert!(found[1].is_none());
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[test]
    fn test_keys_are_exact_and_per_model() {
        let temp = TempDir::new().unwrap();
        let cache = EmbeddingCache::open(&temp.path().join("embeddings.sqlite")).unwrap();

        cache
            .put_many("mock", &[("Dragon", [1.0f32, 0.0].as_slice())])
            .unwrap();

        let found = cache.get_many("mock", &["dragon", "Dragon "]).unwrap();
        assert!(found.iter().all(|v| v.is_none()));

        let other_model = cache.get_many("bge-small-en-v1.5", &["Dragon"]).unwrap();
        assert!(other_model[0].is_none());
    }

    #[test]
    fn test_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("embeddings.sqlite");

        {
            let cache = EmbeddingCache::open(&path).unwrap();
            cache
                .put_many("mock", &[("persisted", [0.5f32, 0.5].as_slice())])
                .unwrap();
        }

        let cache = EmbeddingCache::open(&path).unwrap();
        let found = cache.get_many("mock", &["persisted"]).unwrap();
        assert_eq!(found[0].as_deref(), Some([0.5f32, 0.5].as_slice()));
    }
}
