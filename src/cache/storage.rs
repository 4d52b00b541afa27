//! Document storage backends: bounded in-memory and SQLite.

use chrono::{DateTime, Duration, TimeZone, Utc};
use color_eyre::{eyre::eyre, Result};
use moka::sync::Cache;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Mutex;

use super::traits::{CacheStorage, CachedDocument};

/// In-memory storage, bounded by entry count.
pub struct MemoryStorage {
  entries: Cache<String, CachedDocument>,
}

impl MemoryStorage {
  pub fn new(max_entries: u64) -> Self {
    Self {
      entries: Cache::new(max_entries),
    }
  }
}

impl CacheStorage for MemoryStorage {
  fn get(&self, iri: &str) -> Result<Option<CachedDocument>> {
    Ok(self.entries.get(iri))
  }

  fn put(&self, entry: CachedDocument) -> Result<()> {
    self.entries.insert(entry.iri.clone(), entry);
    Ok(())
  }

  fn remove(&self, iri: &str) -> Result<()> {
    self.entries.invalidate(iri);
    Ok(())
  }

  fn remove_expired(&self, now: DateTime<Utc>) -> Result<usize> {
    let expired: Vec<String> = self
      .entries
      .iter()
      .filter(|(_, entry)| !entry.is_valid_at(now))
      .map(|(key, _)| key.to_string())
      .collect();

    for key in &expired {
      self.entries.invalidate(key);
    }
    Ok(expired.len())
  }

  fn clear(&self) -> Result<()> {
    self.entries.invalidate_all();
    self.entries.run_pending_tasks();
    Ok(())
  }
}

/// SQLite-based document storage, surviving process restarts.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
  max_entries: u64,
}

impl SqliteStorage {
  /// Open (or create) the database at `path`.
  pub fn open(path: &Path, max_entries: u64) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let storage = Self {
      conn: Mutex::new(conn),
      max_entries,
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  /// Drop the oldest rows once the table grows past `max_entries`.
  fn enforce_bound(&self, conn: &Connection) -> Result<()> {
    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM document_cache", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count cache rows: {}", e))?;

    let excess = count - self.max_entries as i64;
    if excess > 0 {
      conn
        .execute(
          "DELETE FROM document_cache WHERE key_hash IN (
             SELECT key_hash FROM document_cache ORDER BY stored_at_ms ASC LIMIT ?
           )",
          params![excess],
        )
        .map_err(|e| eyre!("Failed to trim cache: {}", e))?;
    }
    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS document_cache (
    key_hash TEXT PRIMARY KEY,
    iri TEXT NOT NULL,
    data BLOB NOT NULL,
    stored_at_ms INTEGER NOT NULL,
    expires_at_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_document_cache_expires
    ON document_cache(expires_at_ms);
"#;

impl CacheStorage for SqliteStorage {
  fn get(&self, iri: &str) -> Result<Option<CachedDocument>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(Vec<u8>, i64, i64)> = conn
      .query_row(
        "SELECT data, stored_at_ms, expires_at_ms FROM document_cache WHERE key_hash = ?",
        params![key_hash(iri)],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to query cache: {}", e))?;

    match row {
      Some((data, stored_at_ms, expires_at_ms)) => {
        let value = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize cached document: {}", e))?;
        let stored_at = from_millis(stored_at_ms)?;
        Ok(Some(CachedDocument {
          iri: iri.to_string(),
          value,
          stored_at,
          ttl: Duration::milliseconds(expires_at_ms - stored_at_ms),
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, entry: CachedDocument) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let data =
      serde_json::to_vec(&entry.value).map_err(|e| eyre!("Failed to serialize document: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO document_cache (key_hash, iri, data, stored_at_ms, expires_at_ms)
         VALUES (?, ?, ?, ?, ?)",
        params![
          key_hash(&entry.iri),
          entry.iri,
          data,
          entry.stored_at.timestamp_millis(),
          entry.expires_at().timestamp_millis()
        ],
      )
      .map_err(|e| eyre!("Failed to store document: {}", e))?;

    self.enforce_bound(&conn)
  }

  fn remove(&self, iri: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM document_cache WHERE key_hash = ?",
        params![key_hash(iri)],
      )
      .map_err(|e| eyre!("Failed to remove document: {}", e))?;
    Ok(())
  }

  fn remove_expired(&self, now: DateTime<Utc>) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM document_cache WHERE expires_at_ms <= ?",
        params![now.timestamp_millis()],
      )
      .map_err(|e| eyre!("Failed to sweep expired documents: {}", e))
  }

  fn clear(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM document_cache", [])
      .map_err(|e| eyre!("Failed to clear cache: {}", e))?;
    Ok(())
  }
}

/// SHA256 hash for stable, fixed-length keys.
fn key_hash(iri: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(iri.as_bytes());
  hex::encode(hasher.finalize())
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
  Utc
    .timestamp_millis_opt(ms)
    .single()
    .ok_or_else(|| eyre!("Invalid timestamp in cache: {}", ms))
}
