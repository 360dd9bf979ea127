//! Request interception: decide, per request, who answers it.
//!
//! Exactly one strategy runs for each request:
//!
//! | Request                                   | Strategy                          |
//! |-------------------------------------------|-----------------------------------|
//! | non-GET, non-HTTP(S), cross-origin        | left to default handling          |
//! | navigation                                | network first, stored fallback    |
//! | static asset prefix                       | cache first                       |
//! | tracked collection                        | network online, mirror offline    |
//! | other same-origin GET                     | cache first with write-through    |

use tracing::{debug, warn};
use url::Url;

use crate::cache::{CacheLayer, Response};
use crate::config::Config;
use crate::envelope::Envelope;
use crate::mirror::MirrorStore;
use crate::paths::{self, ResourcePath};
use crate::query::{QueryEngine, QueryOptions};
use crate::reachability::Reachability;
use crate::remote::{Method, RemoteRequest, TransportError};

/// A request as seen by the interceptor.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
  pub method: Method,
  pub url: Url,
  /// Top-level document load rather than a subresource fetch
  pub navigate: bool,
}

impl InterceptedRequest {
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      navigate: false,
    }
  }

  pub fn navigation(url: Url) -> Self {
    Self {
      navigate: true,
      ..Self::get(url)
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
  Passthrough,
  NetworkFirst,
  CacheFirst,
  /// Tracked collection; carries the normalized path
  Tracked(ResourcePath),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interception {
  /// Not ours; the caller performs the request itself
  Default,
  Respond(Response),
}

pub struct Interceptor {
  origin: Url,
  deployment_prefixes: Vec<String>,
  static_prefixes: Vec<String>,
  navigation_fallback: Option<Url>,
  tracked: String,
  layer: CacheLayer,
  mirror: MirrorStore,
  query: QueryEngine,
  reachability: Reachability,
}

impl Interceptor {
  pub fn new(
    config: &Config,
    origin: Url,
    layer: CacheLayer,
    mirror: MirrorStore,
    reachability: Reachability,
  ) -> Self {
    let navigation_fallback = config
      .cache
      .navigation_fallback
      .as_deref()
      .and_then(|doc| match origin.join(doc) {
        Ok(url) => Some(url),
        Err(e) => {
          warn!(document = doc, error = %e, "Ignoring invalid navigation fallback");
          None
        }
      });

    Self {
      deployment_prefixes: config.deployment_prefixes.clone(),
      static_prefixes: config.cache.static_prefixes.clone(),
      navigation_fallback,
      tracked: config.tracked_collection(),
      query: QueryEngine::new(mirror.clone(), config.tracked.key_field.clone()),
      origin,
      layer,
      mirror,
      reachability,
    }
  }

  /// Pick the strategy for `request` without running it.
  pub fn strategy(&self, request: &InterceptedRequest) -> Strategy {
    let url = &request.url;
    if request.method != Method::GET || !matches!(url.scheme(), "http" | "https") {
      return Strategy::Passthrough;
    }
    if request.navigate {
      return Strategy::NetworkFirst;
    }
    if self
      .static_prefixes
      .iter()
      .any(|prefix| url.path().starts_with(prefix.as_str()))
    {
      return Strategy::CacheFirst;
    }

    let normalized = paths::normalize(url.as_str(), &self.deployment_prefixes);
    let resource = ResourcePath::parse(&normalized);
    if resource.collection() == self.tracked {
      return Strategy::Tracked(resource);
    }

    if url.origin() == self.origin.origin() {
      Strategy::CacheFirst
    } else {
      Strategy::Passthrough
    }
  }

  /// Answer `request`, or hand it back for default handling.
  pub async fn handle(&self, request: &InterceptedRequest) -> Result<Interception, TransportError> {
    let strategy = self.strategy(request);
    debug!(url = %request.url, ?strategy, "intercepted");

    let response = match strategy {
      Strategy::Passthrough => return Ok(Interception::Default),
      Strategy::NetworkFirst => {
        let fallbacks: Vec<Url> = self.navigation_fallback.iter().cloned().collect();
        self.layer.network_first(&request.url, &fallbacks).await?
      }
      Strategy::CacheFirst => self.layer.cache_first(&request.url).await?,
      Strategy::Tracked(resource) => self.tracked(&request.url, &resource).await?,
    };

    Ok(Interception::Respond(response))
  }

  async fn tracked(&self, url: &Url, resource: &ResourcePath) -> Result<Response, TransportError> {
    let options = QueryOptions::from_url(url);

    if !self.reachability.is_online() {
      let outcome = self.query.execute(resource, &options).await;
      debug!(url = %url, status = outcome.status(), "answered from mirror");
      return Ok(Response::from_query(&outcome));
    }

    let request = RemoteRequest::get(url.clone()).with_header("Accept", "application/json");
    let response = self.layer.transport().send(request).await?;

    let full_read = matches!(resource, ResourcePath::Collection(_)) && !options.restricts_rows();
    if full_read && response.is_success() {
      self.refresh_mirror(resource.collection(), &response.body).await;
    }

    Ok(Response::from_network(response))
  }

  async fn refresh_mirror(&self, resource_key: &str, body: &[u8]) {
    let envelope = match Envelope::from_body(body) {
      Ok(envelope) => envelope,
      Err(e) => {
        warn!(resource_key, error = %e, "Collection body not understood, mirror left as is");
        return;
      }
    };

    let records = envelope.results.len();
    match self.mirror.replace(resource_key, &envelope).await {
      Ok(()) => debug!(resource_key, records, "mirror refreshed"),
      Err(e) => warn!(resource_key, error = %e, "Failed to refresh mirror"),
    }
  }
}
