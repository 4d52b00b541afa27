//! The network boundary: a `Transport` sends one request and returns the
//! raw response. Status codes are not interpreted here.

use async_trait::async_trait;
use std::time::Duration;

use super::request::{Method, Request, Response};
use crate::error::FetchError;

#[async_trait]
pub trait Transport: Send + Sync {
  async fn send(&self, request: &Request) -> Result<Response, FetchError>;
}

/// Transport backed by `reqwest`.
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
}

impl HttpTransport {
  pub fn new() -> Result<Self, FetchError> {
    let client = reqwest::Client::builder()
      .connect_timeout(Duration::from_secs(10))
      .gzip(true)
      .deflate(true)
      .build()
      .map_err(|e| FetchError::RequestSetup(format!("Failed to create HTTP client: {}", e)))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn send(&self, request: &Request) -> Result<Response, FetchError> {
    let method = match request.method {
      Method::Get => reqwest::Method::GET,
    };

    let mut builder = self.client.request(method, &request.url);
    for (key, value) in &request.headers {
      builder = builder.header(key, value);
    }

    let response = builder.send().await?;
    let status = response.status().as_u16();
    let content_type = response
      .headers()
      .get(reqwest::header::CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(String::from);
    let body = response
      .bytes()
      .await
      .map_err(|e| FetchError::Transport(format!("Failed to read body of {}: {}", request.url, e)))?;

    Ok(Response {
      status,
      content_type,
      body,
    })
  }
}

#[cfg(test)]
pub(crate) mod testing {
  //! A scripted transport for tests: canned responses by URL, call counting.

  use super::*;
  use bytes::Bytes;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;

  enum Scripted {
    Respond(Response),
    Fail(FetchError),
  }

  #[derive(Default)]
  pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, Scripted>>,
    sent: Mutex<Vec<Request>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
  }

  impl ScriptedTransport {
    pub fn new() -> Self {
      Self::default()
    }

    /// Delay every response, so concurrent callers overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
      self.delay = Some(delay);
      self
    }

    pub fn json(self, url: &str, body: serde_json::Value) -> Self {
      self.respond(
        url,
        200,
        Some("application/activity+json"),
        Bytes::from(body.to_string()),
      )
    }

    pub fn status(self, url: &str, status: u16) -> Self {
      self.respond(url, status, None, Bytes::new())
    }

    pub fn bytes(self, url: &str, content_type: &str, body: &'static [u8]) -> Self {
      self.respond(url, 200, Some(content_type), Bytes::from_static(body))
    }

    pub fn fail(self, url: &str, error: FetchError) -> Self {
      self
        .routes
        .lock()
        .unwrap()
        .insert(url.to_string(), Scripted::Fail(error));
      self
    }

    pub fn respond(self, url: &str, status: u16, content_type: Option<&str>, body: Bytes) -> Self {
      self.routes.lock().unwrap().insert(
        url.to_string(),
        Scripted::Respond(Response {
          status,
          content_type: content_type.map(String::from),
          body,
        }),
      );
      self
    }

    pub fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }

    /// Every request that reached the transport, in order.
    pub fn sent(&self) -> Vec<Request> {
      self.sent.lock().unwrap().clone()
    }
  }

  #[async_trait]
  impl Transport for ScriptedTransport {
    async fn send(&self, request: &Request) -> Result<Response, FetchError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self.sent.lock().unwrap().push(request.clone());
      if let Some(delay) = self.delay {
        tokio::time::sleep(delay).await;
      }

      match self.routes.lock().unwrap().get(&request.url) {
        Some(Scripted::Respond(response)) => Ok(response.clone()),
        Some(Scripted::Fail(error)) => Err(error.clone()),
        None => Ok(Response {
          status: 404,
          content_type: None,
          body: Bytes::new(),
        }),
      }
    }
  }
}
