//! Core traits and types for the caching system.

use chrono::{DateTime, Duration, Utc};
use color_eyre::Result;
use std::fmt;

use super::blob::BinaryHandle;

/// Which half of the cache a key lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
  /// Structured documents (JSON)
  Document,
  /// Binary payloads held behind revocable handles
  Blob,
}

impl Namespace {
  pub fn as_str(&self) -> &'static str {
    match self {
      Namespace::Document => "document",
      Namespace::Blob => "blob",
    }
  }
}

/// Identity used for deduplication and caching.
///
/// Keys compare by exact string equality on the IRI; no normalization is done,
/// so `https://a/x` and `https://a/x/` are different resources.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
  pub iri: String,
  pub namespace: Namespace,
}

impl ResourceKey {
  pub fn document(iri: impl Into<String>) -> Self {
    Self {
      iri: iri.into(),
      namespace: Namespace::Document,
    }
  }

  pub fn blob(iri: impl Into<String>) -> Self {
    Self {
      iri: iri.into(),
      namespace: Namespace::Blob,
    }
  }
}

impl fmt::Display for ResourceKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.namespace.as_str(), self.iri)
  }
}

/// A cached value: either a document or a handle to a binary payload.
#[derive(Debug, Clone)]
pub enum CacheValue {
  Document(serde_json::Value),
  Blob(BinaryHandle),
}

impl CacheValue {
  pub fn namespace(&self) -> Namespace {
    match self {
      CacheValue::Document(_) => Namespace::Document,
      CacheValue::Blob(_) => Namespace::Blob,
    }
  }
}

/// A stored document together with its expiry bookkeeping.
#[derive(Debug, Clone)]
pub struct CachedDocument {
  pub iri: String,
  pub value: serde_json::Value,
  pub stored_at: DateTime<Utc>,
  pub ttl: Duration,
}

impl CachedDocument {
  pub fn expires_at(&self) -> DateTime<Utc> {
    self.stored_at + self.ttl
  }

  /// Valid iff `now < stored_at + ttl`.
  pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
    now < self.expires_at()
  }
}

/// Trait for document storage backends.
pub trait CacheStorage: Send + Sync {
  /// Get a stored document by IRI, expired or not.
  fn get(&self, iri: &str) -> Result<Option<CachedDocument>>;

  /// Store a document, replacing any previous entry for the IRI.
  fn put(&self, entry: CachedDocument) -> Result<()>;

  /// Remove one entry.
  fn remove(&self, iri: &str) -> Result<()>;

  /// Drop every entry that is no longer valid at `now`. Returns how many went.
  fn remove_expired(&self, now: DateTime<Utc>) -> Result<usize>;

  /// Drop everything.
  fn clear(&self) -> Result<()>;
}

/// Indicates where a fetched value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Served from the cache without touching the network
  Cache,
}

/// Convert a std duration into the chrono one used for expiry math.
///
/// Capped at a century so `stored_at + ttl` can never overflow.
pub(crate) fn ttl_from_std(ttl: std::time::Duration) -> Duration {
  let cap = Duration::days(36_500);
  Duration::from_std(ttl).map(|d| d.min(cap)).unwrap_or(cap)
}
