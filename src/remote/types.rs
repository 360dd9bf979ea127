use reqwest::Method;
use serde::Serialize;
use thiserror::Error;
use url::Url;

/// Outbound request handed to a [`super::Transport`].
#[derive(Debug, Clone)]
pub struct RemoteRequest {
  pub method: Method,
  pub url: Url,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
}

impl RemoteRequest {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      headers: Vec::new(),
      body: None,
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  pub fn with_json<T: Serialize>(mut self, payload: &T) -> serde_json::Result<Self> {
    self.body = Some(serde_json::to_vec(payload)?);
    Ok(self.with_header("Content-Type", "application/json"))
  }
}

/// Response as received from the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl RemoteResponse {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Statuses that mean "the backend was not reached", not "the backend said no".
  pub fn is_network_classified(&self) -> bool {
    matches!(self.status, 0 | 503 | 504)
  }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
  #[error("network unreachable: {0}")]
  Network(String),
  #[error("request timed out")]
  Timeout,
  #[error("invalid request: {0}")]
  Invalid(String),
}

impl TransportError {
  /// Whether a mutation failing this way should be queued for replay.
  pub fn is_network_classified(&self) -> bool {
    matches!(self, Self::Network(_) | Self::Timeout)
  }
}
