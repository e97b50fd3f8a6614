use futures::future::BoxFuture;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{Method, RemoteApi, RemoteError, RemoteRequest, RemoteResult};

/// reqwest-backed [`RemoteApi`].
#[derive(Clone)]
pub struct HttpRemote {
  client: reqwest::Client,
  base_url: Url,
  token: Option<String>,
}

impl HttpRemote {
  pub fn new(base_url: &str, timeout: Duration, token: Option<String>) -> RemoteResult<Self> {
    let mut base_url =
      Url::parse(base_url).map_err(|e| RemoteError::InvalidTarget(format!("{}: {}", base_url, e)))?;

    // Url::join replaces the last segment unless the path ends with '/'
    if !base_url.path().ends_with('/') {
      let path = format!("{}/", base_url.path());
      base_url.set_path(&path);
    }

    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| RemoteError::Transport(format!("Failed to create HTTP client: {}", e)))?;

    Ok(Self {
      client,
      base_url,
      token,
    })
  }

  /// Resolve a target path against the base URL.
  pub fn url_for(&self, target: &str) -> RemoteResult<Url> {
    self
      .base_url
      .join(target.trim_start_matches('/'))
      .map_err(|e| RemoteError::InvalidTarget(format!("{}: {}", target, e)))
  }

  async fn dispatch(&self, request: RemoteRequest) -> RemoteResult<Option<Value>> {
    let url = self.url_for(&request.target)?;

    let mut builder = match request.method {
      Method::Get => self.client.get(url),
      Method::Post => self.client.post(url),
      Method::Put => self.client.put(url),
      Method::Delete => self.client.delete(url),
    };
    if let Some(token) = &self.token {
      builder = builder.bearer_auth(token);
    }
    if let Some(body) = &request.body {
      builder = builder.json(body);
    }

    let response = builder.send().await.map_err(map_reqwest_error)?;
    let status = response.status();
    let text = response.text().await.map_err(map_reqwest_error)?;

    if !status.is_success() {
      return Err(RemoteError::Status {
        status: status.as_u16(),
        body: text,
      });
    }

    if text.trim().is_empty() {
      return Ok(None);
    }

    match serde_json::from_str(&text) {
      Ok(value) => Ok(Some(value)),
      Err(e) if request.method == Method::Get => Err(RemoteError::Decode(e.to_string())),
      Err(e) => {
        debug!(endpoint = %request.target, "Ignoring non-JSON response body: {}", e);
        Ok(None)
      }
    }
  }
}

impl RemoteApi for HttpRemote {
  fn send(&self, request: RemoteRequest) -> BoxFuture<'_, RemoteResult<Option<Value>>> {
    Box::pin(self.dispatch(request))
  }
}

fn map_reqwest_error(e: reqwest::Error) -> RemoteError {
  if e.is_timeout() {
    RemoteError::Timeout
  } else {
    RemoteError::Transport(e.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn remote(base: &str) -> HttpRemote {
    HttpRemote::new(base, Duration::from_secs(1), None).unwrap()
  }

  #[test]
  fn test_url_for_keeps_base_path() {
    let r = remote("https://api.example.com/v1");
    assert_eq!(
      r.url_for("/listings/42").unwrap().as_str(),
      "https://api.example.com/v1/listings/42"
    );
    assert_eq!(
      r.url_for("favorites").unwrap().as_str(),
      "https://api.example.com/v1/favorites"
    );
  }

  #[test]
  fn test_invalid_base_url() {
    assert!(matches!(
      HttpRemote::new("not a url", Duration::from_secs(1), None),
      Err(RemoteError::InvalidTarget(_))
    ));
  }

  #[tokio::test]
  async fn test_unreachable_server_is_transport_error() {
    let r = remote("http://127.0.0.1:1/");
    let err = r.send(RemoteRequest::get("/health")).await.unwrap_err();
    assert!(err.is_unreachable());
  }
}
