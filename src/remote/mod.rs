//! The server-side collaborator, reached only through [`RemoteApi`].

mod http;

use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

pub use http::HttpRemote;

/// Error type for remote calls.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
  /// The request never got an answer (DNS, refused connection, reset).
  #[error("transport error: {0}")]
  Transport(String),

  #[error("request timed out")]
  Timeout,

  /// The server answered with a non-2xx status.
  #[error("HTTP {status}: {body}")]
  Status { status: u16, body: String },

  #[error("invalid target '{0}'")]
  InvalidTarget(String),

  #[error("failed to decode response: {0}")]
  Decode(String),
}

impl RemoteError {
  /// True when the server could not be reached at all, as opposed to a
  /// server that answered and refused.
  pub fn is_unreachable(&self) -> bool {
    matches!(self, RemoteError::Transport(_) | RemoteError::Timeout)
  }
}

/// Result type for remote calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// HTTP verbs the engine issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Post,
  Put,
  Delete,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Delete => "DELETE",
    }
  }
}

impl std::fmt::Display for Method {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One call against the server: `METHOD target` with an optional JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
  pub method: Method,
  /// Path relative to the configured base URL (e.g. `/listings/42`)
  pub target: String,
  pub body: Option<Value>,
}

impl RemoteRequest {
  pub fn get(target: impl Into<String>) -> Self {
    Self {
      method: Method::Get,
      target: target.into(),
      body: None,
    }
  }
}

/// Transport to the authoritative server.
///
/// Implementations resolve `Ok` only for 2xx answers; the returned value is
/// the decoded response body, if there was one.
pub trait RemoteApi: Send + Sync {
  fn send(&self, request: RemoteRequest) -> BoxFuture<'_, RemoteResult<Option<Value>>>;
}
