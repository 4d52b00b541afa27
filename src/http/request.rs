//! Request, response and payload types passed through the pipeline.

use bytes::Bytes;
use std::collections::BTreeMap;

use crate::cache::{BinaryHandle, CacheSource, Namespace, ResourceKey};

/// HTTP methods the engine issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
    }
  }

  /// Read operations are the only ones served from or stored in the cache.
  pub fn is_read(&self) -> bool {
    matches!(self, Method::Get)
  }
}

/// What the caller expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
  /// A structured (JSON) document
  Document,
  /// Raw bytes, handed out behind a [`BinaryHandle`]
  Blob,
}

impl PayloadKind {
  pub fn namespace(&self) -> Namespace {
    match self {
      PayloadKind::Document => Namespace::Document,
      PayloadKind::Blob => Namespace::Blob,
    }
  }
}

/// An outgoing request.
///
/// `iri` is the resource identity and never changes; `url` is where the
/// request is actually sent and may be rewritten by request stages.
#[derive(Debug, Clone)]
pub struct Request {
  pub iri: String,
  pub url: String,
  pub method: Method,
  pub headers: BTreeMap<String, String>,
  pub with_credentials: bool,
  pub expect: PayloadKind,
}

impl Request {
  pub fn get(iri: impl Into<String>, expect: PayloadKind) -> Self {
    let iri = iri.into();
    Self {
      url: iri.clone(),
      iri,
      method: Method::Get,
      headers: BTreeMap::new(),
      with_credentials: false,
      expect,
    }
  }

  /// Add a header to the request.
  pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.insert(key.into(), value.into());
    self
  }

  pub fn credentials(mut self, with_credentials: bool) -> Self {
    self.with_credentials = with_credentials;
    self
  }

  pub fn key(&self) -> ResourceKey {
    ResourceKey {
      iri: self.iri.clone(),
      namespace: self.expect.namespace(),
    }
  }
}

/// What came back over the wire, before decoding.
#[derive(Debug, Clone)]
pub struct Response {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Bytes,
}

impl Response {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// A decoded response body.
#[derive(Debug, Clone)]
pub enum Payload {
  Document(serde_json::Value),
  Blob(BinaryHandle),
}

/// The outcome of a successful fetch.
///
/// A cache hit and a network result have the same shape; only `source`
/// tells them apart.
#[derive(Debug, Clone)]
pub struct Fetched {
  pub iri: String,
  pub payload: Payload,
  pub source: CacheSource,
}

impl Fetched {
  pub fn from_network(iri: impl Into<String>, payload: Payload) -> Self {
    Self {
      iri: iri.into(),
      payload,
      source: CacheSource::Network,
    }
  }

  pub fn from_cache(iri: impl Into<String>, payload: Payload) -> Self {
    Self {
      iri: iri.into(),
      payload,
      source: CacheSource::Cache,
    }
  }

  /// True when served from the cache instead of the network.
  pub fn is_cached(&self) -> bool {
    self.source == CacheSource::Cache
  }

  pub fn document(&self) -> Option<&serde_json::Value> {
    match &self.payload {
      Payload::Document(doc) => Some(doc),
      Payload::Blob(_) => None,
    }
  }

  pub fn into_document(self) -> Option<serde_json::Value> {
    match self.payload {
      Payload::Document(doc) => Some(doc),
      Payload::Blob(_) => None,
    }
  }

  pub fn blob(&self) -> Option<&BinaryHandle> {
    match &self.payload {
      Payload::Blob(handle) => Some(handle),
      Payload::Document(_) => None,
    }
  }
}
