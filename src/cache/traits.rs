//! Core types shared by the content cache and the interceptor.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use url::Url;

use crate::query::QueryOutcome;
use crate::remote::{Method, RemoteResponse};

/// Identity of a cached request: method plus full URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestKey {
  key: String,
  path: String,
}

impl RequestKey {
  pub fn new(method: &Method, url: &Url) -> Self {
    Self {
      key: format!("{} {}", method, url),
      path: url.path().to_string(),
    }
  }

  pub fn get(url: &Url) -> Self {
    Self::new(&Method::GET, url)
  }

  pub fn as_str(&self) -> &str {
    &self.key
  }

  /// URL path, used to decide which entries migrate between generations.
  pub fn path(&self) -> &str {
    &self.path
  }

  /// SHA256 of the key, for stable fixed-length storage keys
  pub fn hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.key.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// A stored response. Immutable; a refetch replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
  pub generation: String,
  pub request_key: String,
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  pub stored_at: DateTime<Utc>,
}

/// Indicates where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh data from network
  Network,
  /// Content cache, current generation
  Cache,
  /// Synthesized from the local mirror while offline
  Mirror,
}

/// Response handed back to whoever issued the intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  pub source: ResponseSource,
}

impl Response {
  pub fn from_network(response: RemoteResponse) -> Self {
    Self {
      status: response.status,
      headers: response.headers,
      body: response.body,
      source: ResponseSource::Network,
    }
  }

  pub fn from_cache(cached: CachedResponse) -> Self {
    Self {
      status: cached.status,
      headers: cached.headers,
      body: cached.body,
      source: ResponseSource::Cache,
    }
  }

  pub fn from_query(outcome: &QueryOutcome) -> Self {
    Self {
      status: outcome.status(),
      headers: vec![(
        "Content-Type".to_string(),
        outcome.content_type().to_string(),
      )],
      body: outcome.body(),
      source: ResponseSource::Mirror,
    }
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}
