//! Fetch error taxonomy and HTTP status classification.

use thiserror::Error;

/// Errors surfaced by a single resource fetch.
///
/// Every variant is scoped to the resource being resolved; none of them
/// poisons the client. The type is `Clone` so a coalesced fetch can hand the
/// same outcome to every waiting caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
  /// The server answered 401 or 403.
  #[error("unauthorized (HTTP {status})")]
  Unauthorized { status: u16 },

  /// The server answered 404, or the body was empty or not a document.
  #[error("not found: {reason}")]
  NotFound { reason: String },

  /// Any other non-success status.
  #[error("request failed with HTTP {status}")]
  Status { status: u16 },

  /// The request was sent but no response came back.
  #[error("no response received: {0}")]
  Transport(String),

  /// The request could not be built or sent at all.
  #[error("malformed request: {0}")]
  RequestSetup(String),

  /// The fetch or the caller's wait was cancelled.
  #[error("cancelled")]
  Cancelled,
}

/// Coarse failure classes the rendering layer distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
  Unauthorized,
  NotFound,
}

impl FetchError {
  /// Classify a non-success HTTP status.
  pub fn from_status(status: u16) -> Self {
    match status {
      401 | 403 => FetchError::Unauthorized { status },
      404 => FetchError::NotFound {
        reason: format!("HTTP {}", status),
      },
      _ => FetchError::Status { status },
    }
  }

  /// Not-found for a body that is empty where a document was required.
  pub fn empty_document(iri: &str) -> Self {
    FetchError::NotFound {
      reason: format!("empty document at {}", iri),
    }
  }

  /// Consumer-facing class: 401/403 are unauthorized, anything else reads as not found.
  pub fn kind(&self) -> FailureKind {
    match self {
      FetchError::Unauthorized { .. } => FailureKind::Unauthorized,
      _ => FailureKind::NotFound,
    }
  }
}

impl From<reqwest::Error> for FetchError {
  fn from(e: reqwest::Error) -> Self {
    if let Some(status) = e.status() {
      FetchError::from_status(status.as_u16())
    } else if e.is_builder() {
      FetchError::RequestSetup(e.to_string())
    } else {
      FetchError::Transport(e.to_string())
    }
  }
}

impl From<url::ParseError> for FetchError {
  fn from(e: url::ParseError) -> Self {
    FetchError::RequestSetup(e.to_string())
  }
}
