//! Binary handles and the bounded blob store that owns them.

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use moka::notification::RemovalCause;
use moka::sync::Cache;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// A process-local, revocable reference to a binary payload.
///
/// Clones share the same payload. Once revoked, every clone reports
/// `bytes() == None`.
#[derive(Clone)]
pub struct BinaryHandle {
  inner: Arc<HandleInner>,
}

struct HandleInner {
  url: String,
  content_type: Option<String>,
  len: usize,
  bytes: RwLock<Option<Bytes>>,
}

impl BinaryHandle {
  /// Materialize a handle from a raw payload.
  pub fn new(bytes: Bytes, content_type: Option<String>) -> Self {
    let id = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
    Self {
      inner: Arc::new(HandleInner {
        url: format!("blob:pubfetch/{}", id),
        content_type,
        len: bytes.len(),
        bytes: RwLock::new(Some(bytes)),
      }),
    }
  }

  /// Opaque `blob:` URL naming this handle.
  pub fn url(&self) -> &str {
    &self.inner.url
  }

  pub fn content_type(&self) -> Option<&str> {
    self.inner.content_type.as_deref()
  }

  /// Payload size at creation time.
  pub fn len(&self) -> usize {
    self.inner.len
  }

  pub fn is_empty(&self) -> bool {
    self.inner.len == 0
  }

  /// The payload, or `None` once revoked.
  pub fn bytes(&self) -> Option<Bytes> {
    self
      .inner
      .bytes
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  pub fn is_revoked(&self) -> bool {
    self
      .inner
      .bytes
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .is_none()
  }

  /// Release the payload. Idempotent.
  pub fn revoke(&self) {
    let released = self
      .inner
      .bytes
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .take();
    if released.is_some() {
      debug!(handle = %self.inner.url, "revoked blob handle");
    }
  }
}

impl fmt::Debug for BinaryHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BinaryHandle")
      .field("url", &self.inner.url)
      .field("content_type", &self.inner.content_type)
      .field("len", &self.inner.len)
      .field("revoked", &self.is_revoked())
      .finish()
  }
}

impl PartialEq for BinaryHandle {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.inner, &other.inner)
  }
}

#[derive(Clone)]
struct BlobEntry {
  handle: BinaryHandle,
  stored_at: DateTime<Utc>,
  ttl: Duration,
}

/// Size-bounded store of binary handles.
///
/// The store owns every handle it holds: a handle is revoked exactly when its
/// entry leaves the store, whether by eviction, replacement, expiry or flush.
pub struct BlobStore {
  entries: Cache<String, BlobEntry>,
}

impl BlobStore {
  pub fn new(max_entries: u64) -> Self {
    let entries = Cache::builder()
      .max_capacity(max_entries)
      .eviction_listener(|key: Arc<String>, entry: BlobEntry, cause: RemovalCause| {
        debug!(iri = %key, ?cause, "blob entry removed");
        entry.handle.revoke();
      })
      .build();
    Self { entries }
  }

  pub fn put(&self, iri: &str, handle: BinaryHandle, ttl: Duration, now: DateTime<Utc>) {
    self.entries.insert(
      iri.to_string(),
      BlobEntry {
        handle,
        stored_at: now,
        ttl,
      },
    );
  }

  /// Look up a live handle; an expired entry is evicted on the spot.
  pub fn get(&self, iri: &str, now: DateTime<Utc>) -> Option<BinaryHandle> {
    let entry = self.entries.get(iri)?;
    if now < entry.stored_at + entry.ttl && !entry.handle.is_revoked() {
      Some(entry.handle)
    } else {
      self.entries.invalidate(iri);
      None
    }
  }

  /// Drop one entry, revoking its handle.
  pub fn remove(&self, iri: &str) {
    self.entries.invalidate(iri);
  }

  /// Drop every entry, revoking all handles.
  pub fn flush(&self) {
    for (key, _) in self.entries.iter() {
      self.entries.invalidate(key.as_str());
    }
    self.entries.invalidate_all();
    self.entries.run_pending_tasks();
  }

  pub fn len(&self) -> u64 {
    self.entries.run_pending_tasks();
    self.entries.entry_count()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn handle(data: &'static [u8]) -> BinaryHandle {
    BinaryHandle::new(Bytes::from_static(data), Some("image/png".into()))
  }

  #[test]
  fn test_revoke_is_shared_by_clones() {
    let h = handle(b"png");
    let clone = h.clone();
    assert_eq!(clone.bytes().as_deref(), Some(&b"png"[..]));

    h.revoke();
    assert!(clone.is_revoked());
    assert_eq!(clone.bytes(), None);
    assert_eq!(clone.len(), 3);
  }

  #[test]
  fn test_handles_have_distinct_urls() {
    assert_ne!(handle(b"a").url(), handle(b"a").url());
  }

  #[test]
  fn test_expired_entry_is_revoked_on_read() {
    let store = BlobStore::new(16);
    let h = handle(b"img");
    let now = Utc::now();
    store.put("https://a.example/img.png", h.clone(), Duration::minutes(20), now);

    assert_eq!(
      store.get("https://a.example/img.png", now + Duration::minutes(19)),
      Some(h.clone())
    );
    assert_eq!(
      store.get("https://a.example/img.png", now + Duration::minutes(20)),
      None
    );
    assert!(h.is_revoked());
  }

  #[test]
  fn test_replacement_revokes_previous_handle() {
    let store = BlobStore::new(16);
    let now = Utc::now();
    let old = handle(b"old");
    let new = handle(b"new");
    store.put("https://a.example/i", old.clone(), Duration::minutes(20), now);
    store.put("https://a.example/i", new.clone(), Duration::minutes(20), now);

    assert!(old.is_revoked());
    assert!(!new.is_revoked());
  }

  #[test]
  fn test_flush_revokes_everything() {
    let store = BlobStore::new(16);
    let now = Utc::now();
    let a = handle(b"a");
    let b = handle(b"b");
    store.put("https://a.example/a", a.clone(), Duration::minutes(20), now);
    store.put("https://a.example/b", b.clone(), Duration::minutes(20), now);

    store.flush();
    assert!(a.is_revoked());
    assert!(b.is_revoked());
    assert!(store.is_empty());
  }

  #[test]
  fn test_capacity_bound_revokes_evicted() {
    let store = BlobStore::new(4);
    let now = Utc::now();
    let handles: Vec<BinaryHandle> = (0..10).map(|_| handle(b"x")).collect();
    for (i, h) in handles.iter().enumerate() {
      store.put(&format!("https://a.example/{}", i), h.clone(), Duration::minutes(20), now);
    }

    let kept = store.len();
    assert!(kept <= 4);
    let revoked = handles.iter().filter(|h| h.is_revoked()).count() as u64;
    assert_eq!(revoked, 10 - kept);
  }
}
