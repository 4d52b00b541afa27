//! Coalescing HTTP clients, one per pipeline configuration.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use super::coalesce::Coalescer;
use super::interceptor::{
  classify, AttachCredentials, CacheLookup, CachePopulate, Intercept, Pipeline, ProxyRewrite,
};
use super::request::{Fetched, Payload, PayloadKind, Request, Response};
use super::transport::{HttpTransport, Transport};
use crate::cache::{BinaryHandle, CacheStore};
use crate::config::Config;
use crate::error::FetchError;

/// A client that deduplicates concurrent requests per resource and runs every
/// request through its pipeline.
///
/// Cloning is cheap and clones share the in-flight map.
#[derive(Clone)]
pub struct Client {
  inner: Arc<ClientInner>,
}

struct ClientInner {
  transport: Arc<dyn Transport>,
  pipeline: Pipeline,
  coalescer: Coalescer<Fetched>,
  kind: PayloadKind,
  accept: String,
  credentials: bool,
}

/// Builder for a [`Client`].
pub struct ClientBuilder {
  transport: Arc<dyn Transport>,
  pipeline: Pipeline,
  kind: PayloadKind,
  accept: String,
  credentials: bool,
}

impl ClientBuilder {
  pub fn new(transport: Arc<dyn Transport>) -> Self {
    Self {
      transport,
      pipeline: Pipeline::new(),
      kind: PayloadKind::Document,
      accept: "application/activity+json".to_string(),
      credentials: true,
    }
  }

  pub fn pipeline(mut self, pipeline: Pipeline) -> Self {
    self.pipeline = pipeline;
    self
  }

  pub fn kind(mut self, kind: PayloadKind) -> Self {
    self.kind = kind;
    self
  }

  pub fn accept(mut self, accept: impl Into<String>) -> Self {
    self.accept = accept.into();
    self
  }

  /// Whether same-origin requests carry credentials. Proxied ones always do.
  pub fn credentials(mut self, credentials: bool) -> Self {
    self.credentials = credentials;
    self
  }

  pub fn build(self) -> Client {
    Client {
      inner: Arc::new(ClientInner {
        transport: self.transport,
        pipeline: self.pipeline,
        coalescer: Coalescer::new(),
        kind: self.kind,
        accept: self.accept,
        credentials: self.credentials,
      }),
    }
  }
}

impl Client {
  pub fn builder(transport: Arc<dyn Transport>) -> ClientBuilder {
    ClientBuilder::new(transport)
  }

  /// Rewrite only: proxy remote resources, never cache.
  pub fn plain(config: &Config, transport: Arc<dyn Transport>) -> Result<Self, FetchError> {
    Ok(
      Self::builder(transport)
        .accept(config.accept.clone())
        .pipeline(base_pipeline(config)?)
        .build(),
    )
  }

  /// Rewrite plus document caching.
  pub fn documents(
    config: &Config,
    transport: Arc<dyn Transport>,
    cache: Arc<CacheStore>,
  ) -> Result<Self, FetchError> {
    let pipeline = base_pipeline(config)?
      .request_stage(CacheLookup::new(cache.clone()))
      .response_stage(CachePopulate::new(
        cache,
        config.cache.document_ttl(),
        config.cache.never_cache.clone(),
      ));

    Ok(
      Self::builder(transport)
        .accept(config.accept.clone())
        .pipeline(pipeline)
        .build(),
    )
  }

  /// Rewrite plus blob caching under the binary namespace with the longer TTL.
  pub fn blobs(
    config: &Config,
    transport: Arc<dyn Transport>,
    cache: Arc<CacheStore>,
  ) -> Result<Self, FetchError> {
    let pipeline = base_pipeline(config)?
      .request_stage(CacheLookup::new(cache.clone()))
      .response_stage(CachePopulate::new(
        cache,
        config.cache.blob_ttl(),
        config.cache.never_cache.clone(),
      ));

    Ok(
      Self::builder(transport)
        .kind(PayloadKind::Blob)
        .accept("*/*")
        .pipeline(pipeline)
        .build(),
    )
  }

  /// GET `iri` through the pipeline, sharing any request already in flight.
  pub async fn get(&self, iri: &str) -> Result<Fetched, FetchError> {
    self.get_with(iri, &CancellationToken::new()).await
  }

  /// Like [`Client::get`], but stops waiting when `cancel` fires.
  pub async fn get_with(&self, iri: &str, cancel: &CancellationToken) -> Result<Fetched, FetchError> {
    let request = Request::get(iri, self.inner.kind)
      .header("Accept", self.inner.accept.clone())
      .credentials(self.inner.credentials);
    let inner = Arc::clone(&self.inner);

    self
      .inner
      .coalescer
      .run(request.key(), cancel, move || async move { inner.execute(request).await })
      .await
  }

  /// GET a document, failing if the client hands out blobs.
  pub async fn get_document(
    &self,
    iri: &str,
    cancel: &CancellationToken,
  ) -> Result<serde_json::Value, FetchError> {
    self
      .get_with(iri, cancel)
      .await?
      .into_document()
      .ok_or_else(|| FetchError::RequestSetup(format!("{} was not fetched as a document", iri)))
  }

  pub fn in_flight(&self) -> usize {
    self.inner.coalescer.in_flight()
  }

  /// How many calls were served by attaching to an in-flight request.
  pub fn suppressed(&self) -> u64 {
    self.inner.coalescer.suppressed()
  }

  /// Cancel every in-flight request made through this client.
  pub fn shutdown(&self) {
    self.inner.coalescer.shutdown();
  }
}

impl ClientInner {
  async fn execute(&self, request: Request) -> Result<Fetched, FetchError> {
    let request = match self.pipeline.before(request)? {
      Intercept::Continue(request) => request,
      Intercept::Respond(fetched) => return Ok(fetched),
    };

    debug!(iri = %request.iri, url = %request.url, "sending request");
    let response = classify(self.transport.send(&request).await?)?;
    let payload = decode(&request, response)?;
    self
      .pipeline
      .after(&request, Fetched::from_network(request.iri.clone(), payload))
  }
}

/// Decode a successful body into the payload the request expects.
///
/// An empty document body decodes to `null`; deciding whether that is an
/// error is left to the caller.
fn decode(request: &Request, response: Response) -> Result<Payload, FetchError> {
  match request.expect {
    PayloadKind::Blob => Ok(Payload::Blob(BinaryHandle::new(
      response.body,
      response.content_type,
    ))),
    PayloadKind::Document if response.body.iter().all(u8::is_ascii_whitespace) => {
      Ok(Payload::Document(serde_json::Value::Null))
    }
    PayloadKind::Document => serde_json::from_slice(&response.body)
      .map(Payload::Document)
      .map_err(|e| FetchError::NotFound {
        reason: format!("invalid document at {}: {}", request.iri, e),
      }),
  }
}

fn base_pipeline(config: &Config) -> Result<Pipeline, FetchError> {
  let origin = Url::parse(&config.origin)?;
  let proxy = config.proxy_url.as_deref().map(Url::parse).transpose()?;

  Ok(
    Pipeline::new()
      .request_stage(ProxyRewrite::new(origin, proxy))
      .request_stage(AttachCredentials::new(config.session.clone())),
  )
}

/// The three client configurations sharing one cache.
#[derive(Clone)]
pub struct Clients {
  /// Rewrite only; used for collection traversal
  pub plain: Client,
  /// Cached documents
  pub documents: Client,
  /// Cached binary payloads
  pub blobs: Client,
  pub cache: Arc<CacheStore>,
}

impl Clients {
  pub fn new(
    config: &Config,
    transport: Arc<dyn Transport>,
    cache: Arc<CacheStore>,
  ) -> Result<Self, FetchError> {
    Ok(Self {
      plain: Client::plain(config, transport.clone())?,
      documents: Client::documents(config, transport.clone(), cache.clone())?,
      blobs: Client::blobs(config, transport, cache.clone())?,
      cache,
    })
  }

  /// Real network transport and the cache described by `config`.
  pub fn from_config(config: &Config) -> color_eyre::Result<Self> {
    let cache = Arc::new(CacheStore::from_config(config)?);
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new()?);
    Ok(Self::new(config, transport, cache)?)
  }

  /// Cancel all in-flight requests on every client.
  pub fn shutdown(&self) {
    self.plain.shutdown();
    self.documents.shutdown();
    self.blobs.shutdown();
  }
}
