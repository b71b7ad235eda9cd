//! Relational table cache backend.
//!
//! Payloads are base64-encoded and split into fixed-length chunks across 16
//! shard tables (`cache_0` .. `cache_f`). The shard is the first hex digit of
//! the key's SHA-256. A read only succeeds when every chunk `1..=chunk_count`
//! is present and unexpired; anything else is a miss.

use super::CacheBackend;
use crate::sqlite::{acquire_lock, configure_connection};
use crate::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rusqlite::{Connection, params};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Mutex;

/// Hex digits naming the shard tables.
const SHARDS: &str = "0123456789abcdef";

/// `SQLite`-backed chunked cache.
pub struct TableCacheBackend {
    conn: Mutex<Connection>,
    chunk_len: usize,
    sweep_probability: f64,
}

impl TableCacheBackend {
    /// Opens (or creates) the store. `None` keeps it in memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the database cannot be opened or
    /// the shard tables cannot be created.
    pub fn open(path: Option<&Path>, chunk_len: usize, sweep_probability: f64) -> Result<Self> {
        let conn = match path {
            Some(path) => Connection::open(path),
            None => Connection::open_in_memory(),
        }
        .map_err(|e| Error::OperationFailed {
            operation: "open_cache_table".to_string(),
            cause: e.to_string(),
        })?;
        configure_connection(&conn, 5000)?;

        let backend = Self {
            conn: Mutex::new(conn),
            chunk_len: chunk_len.max(1),
            sweep_probability: sweep_probability.clamp(0.0, 1.0),
        };
        backend.initialize_schema()?;
        Ok(backend)
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        for shard in SHARDS.chars() {
            let table = format!("cache_{shard}");
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    cache_key TEXT NOT NULL,
                    sequence INTEGER NOT NULL,
                    chunk_count INTEGER NOT NULL,
                    value TEXT NOT NULL,
                    expires INTEGER NOT NULL,
                    date_added TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                    PRIMARY KEY (cache_key, sequence)
                );
                CREATE INDEX IF NOT EXISTS idx_{table}_expires ON {table} (expires);"
            ))
            .map_err(|e| Error::OperationFailed {
                operation: "create_cache_table".to_string(),
                cause: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Hex SHA-256 of the key; the stored `cache_key`.
    #[must_use]
    pub fn hash_key(key: &str) -> String {
        hex::encode(Sha256::digest(key.as_bytes()))
    }

    /// Shard table holding `key`.
    #[must_use]
    pub fn shard_for(key: &str) -> String {
        let hash = Self::hash_key(key);
        let digit = hash.chars().next().unwrap_or('0');
        format!("cache_{digit}")
    }

    /// Splits an encoded payload into chunks of at most `chunk_len` bytes.
    ///
    /// Base64 output is ASCII, so byte slicing never splits a character. An
    /// empty payload still produces one (empty) chunk.
    fn split_chunks(&self, encoded: &str) -> Vec<String> {
        if encoded.is_empty() {
            return vec![String::new()];
        }
        encoded
            .as_bytes()
            .chunks(self.chunk_len)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect()
    }

    fn should_sweep(&self) -> bool {
        if self.sweep_probability <= 0.0 {
            return false;
        }
        self.sweep_probability >= 1.0 || rand::random::<f64>() < self.sweep_probability
    }

    /// Deletes expired rows from every shard. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if a delete fails.
    pub fn sweep_expired(&self) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        let mut removed = 0;
        for shard in SHARDS.chars() {
            removed += sweep_shard(&conn, &format!("cache_{shard}"))?;
        }
        Ok(removed)
    }
}

fn sweep_shard(conn: &Connection, table: &str) -> Result<usize> {
    conn.execute(
        &format!("DELETE FROM {table} WHERE expires <= unixepoch()"),
        [],
    )
    .map_err(|e| Error::OperationFailed {
        operation: "sweep_cache_table".to_string(),
        cause: e.to_string(),
    })
}

fn query_error(e: &rusqlite::Error) -> Error {
    Error::OperationFailed {
        operation: "cache_table_query".to_string(),
        cause: e.to_string(),
    }
}

impl CacheBackend for TableCacheBackend {
    fn name(&self) -> &'static str {
        "table"
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let table = Self::shard_for(key);
        let hash = Self::hash_key(key);
        let conn = acquire_lock(&self.conn);

        let mut stmt = conn
            .prepare(&format!(
                "SELECT sequence, chunk_count, value FROM {table}
                 WHERE cache_key = ?1 AND expires > unixepoch()
                 ORDER BY sequence"
            ))
            .map_err(|e| query_error(&e))?;
        let rows = stmt
            .query_map(params![hash], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(|e| query_error(&e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| query_error(&e))?;

        let Some(&(_, chunk_count, _)) = rows.first() else {
            return Ok(None);
        };
        let expected = usize::try_from(chunk_count).unwrap_or(0);
        if expected == 0 || rows.len() < expected {
            return Ok(None);
        }

        let mut encoded = String::new();
        for (index, (sequence, _, value)) in rows.iter().take(expected).enumerate() {
            if usize::try_from(*sequence).ok() != Some(index + 1) {
                tracing::debug!(key, sequence, "cache chunk sequence gap, treating as miss");
                return Ok(None);
            }
            encoded.push_str(value);
        }

        match STANDARD.decode(encoded.as_bytes()) {
            Ok(payload) => Ok(Some(payload)),
            Err(e) => {
                tracing::warn!(key, error = %e, "undecodable cache table payload");
                Ok(None)
            },
        }
    }

    fn set(&self, key: &str, payload: &[u8], ttl: u64) -> Result<bool> {
        let table = Self::shard_for(key);
        let hash = Self::hash_key(key);
        let chunks = self.split_chunks(&STANDARD.encode(payload));
        let chunk_count = i64::try_from(chunks.len()).unwrap_or(i64::MAX);
        let ttl = i64::try_from(ttl).unwrap_or(i64::MAX);

        let mut conn = acquire_lock(&self.conn);
        let tx = conn.transaction().map_err(|e| query_error(&e))?;
        {
            let mut upsert = tx
                .prepare(&format!(
                    "INSERT INTO {table} (cache_key, sequence, chunk_count, value, expires)
                     VALUES (?1, ?2, ?3, ?4, unixepoch() + ?5)
                     ON CONFLICT (cache_key, sequence) DO UPDATE SET
                        chunk_count = excluded.chunk_count,
                        value = excluded.value,
                        expires = excluded.expires,
                        date_added = CURRENT_TIMESTAMP"
                ))
                .map_err(|e| query_error(&e))?;
            for (index, chunk) in chunks.iter().enumerate() {
                let sequence = i64::try_from(index + 1).unwrap_or(i64::MAX);
                upsert
                    .execute(params![hash, sequence, chunk_count, chunk, ttl])
                    .map_err(|e| query_error(&e))?;
            }
        }
        // Chunks left over from a longer previous value.
        tx.execute(
            &format!("DELETE FROM {table} WHERE cache_key = ?1 AND sequence > ?2"),
            params![hash, chunk_count],
        )
        .map_err(|e| query_error(&e))?;
        tx.commit().map_err(|e| query_error(&e))?;

        if self.should_sweep() {
            match sweep_shard(&conn, &table) {
                Ok(removed) => tracing::debug!(table, removed, "swept expired cache rows"),
                Err(e) => tracing::warn!(table, error = %e, "cache sweep failed"),
            }
        }
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let table = Self::shard_for(key);
        let hash = Self::hash_key(key);
        let conn = acquire_lock(&self.conn);
        conn.execute(
            &format!("DELETE FROM {table} WHERE cache_key = ?1"),
            params![hash],
        )
        .map_err(|e| query_error(&e))?;
        Ok(true)
    }
}
