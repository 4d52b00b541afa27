//! Composable request and response stages.
//!
//! Request stages run in order before the network call and may rewrite the
//! request or answer it outright (a cache hit). Response stages run in order
//! on successful network results only. Error responses are classified once,
//! by [`classify`], before any response stage sees them.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::origin::{absolutize, is_same_origin, proxy_url};
use super::request::{Fetched, Payload, Request, Response};
use crate::cache::{CacheStore, CacheValue};
use crate::error::FetchError;

/// What a request stage decided.
#[derive(Debug)]
pub enum Intercept {
  /// Hand the (possibly rewritten) request to the next stage.
  Continue(Request),
  /// Skip the network; this is the answer.
  Respond(Fetched),
}

pub trait RequestStage: Send + Sync {
  fn on_request(&self, request: Request) -> Result<Intercept, FetchError>;
}

pub trait ResponseStage: Send + Sync {
  fn on_response(&self, request: &Request, fetched: Fetched) -> Result<Fetched, FetchError>;
}

/// Route requests for other origins through the proxy.
pub struct ProxyRewrite {
  origin: Url,
  proxy: Option<Url>,
}

impl ProxyRewrite {
  pub fn new(origin: Url, proxy: Option<Url>) -> Self {
    Self { origin, proxy }
  }
}

impl RequestStage for ProxyRewrite {
  fn on_request(&self, mut request: Request) -> Result<Intercept, FetchError> {
    let target = absolutize(&request.url, &self.origin)?;
    if is_same_origin(&target, &self.origin) {
      // Only relative references change; absolute same-origin URLs are left as written.
      if Url::parse(&request.url).is_err() {
        request.url = target.to_string();
      }
      return Ok(Intercept::Continue(request));
    }

    if let Some(proxy) = &self.proxy {
      request.url = proxy_url(proxy, target.as_str());
      request.with_credentials = true;
    }
    Ok(Intercept::Continue(request))
  }
}

/// Attach the session cookie to credentialed requests.
pub struct AttachCredentials {
  session: Option<String>,
}

impl AttachCredentials {
  pub fn new(session: Option<String>) -> Self {
    Self { session }
  }
}

impl RequestStage for AttachCredentials {
  fn on_request(&self, request: Request) -> Result<Intercept, FetchError> {
    match &self.session {
      Some(session) if request.with_credentials => {
        Ok(Intercept::Continue(request.header("Cookie", session.clone())))
      }
      _ => Ok(Intercept::Continue(request)),
    }
  }
}

/// Answer read requests from the cache when a live entry exists.
pub struct CacheLookup {
  cache: Arc<CacheStore>,
}

impl CacheLookup {
  pub fn new(cache: Arc<CacheStore>) -> Self {
    Self { cache }
  }
}

impl RequestStage for CacheLookup {
  fn on_request(&self, request: Request) -> Result<Intercept, FetchError> {
    if !request.method.is_read() {
      return Ok(Intercept::Continue(request));
    }

    let payload = match self.cache.get(&request.key()) {
      Ok(Some(CacheValue::Document(doc))) => Payload::Document(doc),
      Ok(Some(CacheValue::Blob(handle))) => Payload::Blob(handle),
      Ok(None) => return Ok(Intercept::Continue(request)),
      Err(e) => {
        warn!(iri = %request.iri, error = %e, "cache lookup failed, going to network");
        return Ok(Intercept::Continue(request));
      }
    };

    debug!(iri = %request.iri, "cache hit");
    Ok(Intercept::Respond(Fetched::from_cache(request.iri, payload)))
  }
}

/// Store successful read results in the cache.
pub struct CachePopulate {
  cache: Arc<CacheStore>,
  ttl: Duration,
  never_cache: HashSet<String>,
}

impl CachePopulate {
  pub fn new(cache: Arc<CacheStore>, ttl: Duration, never_cache: impl IntoIterator<Item = String>) -> Self {
    Self {
      cache,
      ttl,
      never_cache: never_cache.into_iter().collect(),
    }
  }
}

impl ResponseStage for CachePopulate {
  fn on_response(&self, request: &Request, fetched: Fetched) -> Result<Fetched, FetchError> {
    if !request.method.is_read() || fetched.is_cached() || self.never_cache.contains(&request.iri) {
      return Ok(fetched);
    }

    let value = match &fetched.payload {
      Payload::Document(doc) => CacheValue::Document(doc.clone()),
      Payload::Blob(handle) => CacheValue::Blob(handle.clone()),
    };
    match self.cache.put(&request.iri, value, self.ttl) {
      Ok(()) => debug!(iri = %request.iri, "caching"),
      Err(e) => warn!(iri = %request.iri, error = %e, "failed to cache response"),
    }
    Ok(fetched)
  }
}

/// Turn a non-success response into its classified error.
pub fn classify(response: Response) -> Result<Response, FetchError> {
  if response.is_success() {
    Ok(response)
  } else {
    Err(FetchError::from_status(response.status))
  }
}

/// Ordered request and response stages for one client configuration.
#[derive(Default)]
pub struct Pipeline {
  request: Vec<Box<dyn RequestStage>>,
  response: Vec<Box<dyn ResponseStage>>,
}

impl Pipeline {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn request_stage(mut self, stage: impl RequestStage + 'static) -> Self {
    self.request.push(Box::new(stage));
    self
  }

  pub fn response_stage(mut self, stage: impl ResponseStage + 'static) -> Self {
    self.response.push(Box::new(stage));
    self
  }

  /// Run request stages until one answers or all pass.
  pub fn before(&self, mut request: Request) -> Result<Intercept, FetchError> {
    for stage in &self.request {
      match stage.on_request(request)? {
        Intercept::Continue(next) => request = next,
        Intercept::Respond(fetched) => return Ok(Intercept::Respond(fetched)),
      }
    }
    Ok(Intercept::Continue(request))
  }

  /// Run response stages over a successful network result.
  pub fn after(&self, request: &Request, mut fetched: Fetched) -> Result<Fetched, FetchError> {
    for stage in &self.response {
      fetched = stage.on_response(request, fetched)?;
    }
    Ok(fetched)
  }
}
