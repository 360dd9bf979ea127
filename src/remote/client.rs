use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use tracing::debug;

use crate::config::Config;

use super::types::{RemoteRequest, RemoteResponse, TransportError};
use super::Transport;

/// HTTP transport backed by reqwest
#[derive(Clone)]
pub struct HttpClient {
  client: reqwest::Client,
}

impl HttpClient {
  pub fn new(config: &Config) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.network.timeout_secs))
      .user_agent(concat!("offsync/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Transport for HttpClient {
  async fn send(&self, request: RemoteRequest) -> Result<RemoteResponse, TransportError> {
    debug!(method = %request.method, url = %request.url, "Sending request");

    let mut builder = self.client.request(request.method, request.url);
    for (name, value) in &request.headers {
      builder = builder.header(name, value);
    }
    if let Some(body) = request.body {
      builder = builder.body(body);
    }

    let response = builder.send().await.map_err(classify)?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();
    let body = response.bytes().await.map_err(classify)?.to_vec();

    Ok(RemoteResponse {
      status,
      headers,
      body,
    })
  }
}

fn classify(error: reqwest::Error) -> TransportError {
  if error.is_timeout() {
    TransportError::Timeout
  } else if error.is_builder() {
    TransportError::Invalid(error.to_string())
  } else {
    TransportError::Network(error.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  #[tokio::test]
  async fn test_unreachable_host_is_network_classified() {
    let config = Config::from_yaml(
      "origin: http://127.0.0.1:9\ntracked:\n  collection: /u\nnetwork:\n  timeout_secs: 2\n",
    )
    .unwrap();
    let client = HttpClient::new(&config).unwrap();
    let url = Url::parse("http://127.0.0.1:9/u").unwrap();

    let err = client.send(RemoteRequest::get(url)).await.unwrap_err();
    assert!(err.is_network_classified(), "got {:?}", err);
  }
}
