//! Namespaced TTL cache for fetched resources.
//!
//! Documents and binary payloads live in separate namespaces:
//! - documents go to a [`CacheStorage`] backend (bounded memory, or SQLite
//!   when they should outlive the process)
//! - binary payloads are held as revocable [`BinaryHandle`]s in a bounded,
//!   memory-only [`BlobStore`]; handles never survive a restart
//!
//! Expiry is lazy: an entry past `stored_at + ttl` reads as absent, and the
//! only sweep happens once, when the store is created.

mod blob;
mod storage;
mod traits;

pub use blob::{BinaryHandle, BlobStore};
pub use storage::{MemoryStorage, SqliteStorage};
pub use traits::{CacheSource, CacheStorage, CacheValue, CachedDocument, Namespace, ResourceKey};

pub(crate) use traits::ttl_from_std;

use chrono::{DateTime, Utc};
use color_eyre::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{CacheConfig, Config};

/// The cache shared by every client built from one configuration.
pub struct CacheStore {
  documents: Arc<dyn CacheStorage>,
  blobs: BlobStore,
}

impl CacheStore {
  /// Wrap a document backend and run the start-up sweep.
  pub fn new(documents: impl CacheStorage + 'static, max_blobs: u64) -> Result<Self> {
    let store = Self {
      documents: Arc::new(documents),
      blobs: BlobStore::new(max_blobs),
    };
    store.init()?;
    Ok(store)
  }

  /// Memory-only store sized from configuration.
  pub fn in_memory(config: &CacheConfig) -> Result<Self> {
    Self::new(MemoryStorage::new(config.max_documents), config.max_blobs)
  }

  /// Store backed by SQLite when `cache.persist` is set, memory otherwise.
  pub fn from_config(config: &Config) -> Result<Self> {
    if config.cache.persist {
      let path = Config::cache_db_path()?;
      info!(path = %path.display(), "using persistent document cache");
      Self::new(
        SqliteStorage::open(&path, config.cache.max_documents)?,
        config.cache.max_blobs,
      )
    } else {
      Self::in_memory(&config.cache)
    }
  }

  /// Drop documents that expired while nobody was looking and every blob.
  fn init(&self) -> Result<()> {
    let swept = self.documents.remove_expired(Utc::now())?;
    self.blobs.flush();
    debug!(swept, "cache initialized");
    Ok(())
  }

  /// Store `value` under `iri` in the namespace matching the value.
  pub fn put(&self, iri: &str, value: CacheValue, ttl: Duration) -> Result<()> {
    self.put_at(iri, value, ttl, Utc::now())
  }

  pub fn put_at(&self, iri: &str, value: CacheValue, ttl: Duration, now: DateTime<Utc>) -> Result<()> {
    let ttl = ttl_from_std(ttl);
    match value {
      CacheValue::Document(value) => self.documents.put(CachedDocument {
        iri: iri.to_string(),
        value,
        stored_at: now,
        ttl,
      }),
      CacheValue::Blob(handle) => {
        self.blobs.put(iri, handle, ttl, now);
        Ok(())
      }
    }
  }

  /// Look up a live entry; expired entries read as absent.
  pub fn get(&self, key: &ResourceKey) -> Result<Option<CacheValue>> {
    self.get_at(key, Utc::now())
  }

  pub fn get_at(&self, key: &ResourceKey, now: DateTime<Utc>) -> Result<Option<CacheValue>> {
    match key.namespace {
      Namespace::Document => Ok(
        self
          .documents
          .get(&key.iri)?
          .filter(|entry| entry.is_valid_at(now))
          .map(|entry| CacheValue::Document(entry.value)),
      ),
      Namespace::Blob => Ok(self.blobs.get(&key.iri, now).map(CacheValue::Blob)),
    }
  }

  /// Forget one resource.
  pub fn invalidate(&self, key: &ResourceKey) -> Result<()> {
    match key.namespace {
      Namespace::Document => self.documents.remove(&key.iri),
      Namespace::Blob => {
        self.blobs.remove(&key.iri);
        Ok(())
      }
    }
  }

  /// Empty both namespaces, revoking every blob handle.
  pub fn flush(&self) -> Result<()> {
    self.documents.clear()?;
    self.blobs.flush();
    Ok(())
  }

  pub fn blob_count(&self) -> u64 {
    self.blobs.len()
  }
}
