//! Fetch strategies over the content cache and the network.

use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use super::storage::ContentCache;
use super::traits::{CachedResponse, RequestKey, Response};
use crate::remote::{RemoteRequest, RemoteResponse, Transport, TransportError};

/// Combines the generation-aware content cache with a transport.
///
/// The current generation is read from the store on every request, so a
/// generation switch takes effect for the very next fetch. Store failures
/// never fail a fetch; they only cost a cache hit or a write-through.
#[derive(Clone)]
pub struct CacheLayer {
  cache: ContentCache,
  transport: Arc<dyn Transport>,
}

impl CacheLayer {
  pub fn new(cache: ContentCache, transport: Arc<dyn Transport>) -> Self {
    Self { cache, transport }
  }

  pub fn transport(&self) -> &Arc<dyn Transport> {
    &self.transport
  }

  /// Serve from the current generation, or fetch, store and serve.
  pub async fn cache_first(&self, url: &Url) -> Result<Response, TransportError> {
    let key = RequestKey::get(url);
    let generation = self.current_generation().await;

    if let Some(generation) = &generation {
      if let Some(hit) = self.cached(generation, &key).await {
        debug!(url = %url, generation = %generation, "cache hit");
        return Ok(Response::from_cache(hit));
      }
    }

    let response = self.transport.send(RemoteRequest::get(url.clone())).await?;
    if let Some(generation) = &generation {
      self.store(generation, &key, &response).await;
    }
    Ok(Response::from_network(response))
  }

  /// Fetch from the network; when it cannot be reached, serve the stored
  /// copy of `url`, then the first stored copy among `fallbacks`.
  pub async fn network_first(
    &self,
    url: &Url,
    fallbacks: &[Url],
  ) -> Result<Response, TransportError> {
    let key = RequestKey::get(url);
    let generation = self.current_generation().await;

    let err = match self.transport.send(RemoteRequest::get(url.clone())).await {
      Ok(response) => {
        if let Some(generation) = &generation {
          self.store(generation, &key, &response).await;
        }
        return Ok(Response::from_network(response));
      }
      Err(e) => e,
    };

    let Some(generation) = generation else {
      return Err(err);
    };

    let candidates =
      std::iter::once(key).chain(fallbacks.iter().map(RequestKey::get));
    for candidate in candidates {
      if let Some(hit) = self.cached(&generation, &candidate).await {
        debug!(
          url = %url,
          served = candidate.as_str(),
          error = %err,
          "network failed, serving stored copy"
        );
        return Ok(Response::from_cache(hit));
      }
    }

    Err(err)
  }

  async fn current_generation(&self) -> Option<String> {
    match self.cache.current_generation().await {
      Ok(generation) => generation,
      Err(e) => {
        warn!(error = %e, "content cache unavailable");
        None
      }
    }
  }

  async fn cached(
    &self,
    generation: &str,
    key: &RequestKey,
  ) -> Option<CachedResponse> {
    match self.cache.lookup(generation, key).await {
      Ok(hit) => hit,
      Err(e) => {
        warn!(key = key.as_str(), error = %e, "cache lookup failed");
        None
      }
    }
  }

  async fn store(&self, generation: &str, key: &RequestKey, response: &RemoteResponse) {
    // Only successful responses are worth serving again
    if !response.is_success() {
      return;
    }
    if let Err(e) = self.cache.put(generation, key, response).await {
      warn!(key = key.as_str(), error = %e, "cache write-through failed");
    }
  }
}
