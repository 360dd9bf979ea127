//! Generation lifecycle: install, wait, activate.
//!
//! A new generation is registered and precached while the previous one keeps
//! serving. Activation switches the current tag atomically, carries static
//! assets forward and deletes everything older. The interceptor resolves the
//! current generation per request, so activation claims open clients at once.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use super::storage::ContentCache;
use super::traits::RequestKey;
use crate::config::Config;
use crate::event::{Event, EventSender};
use crate::remote::{RemoteRequest, Transport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReport {
  pub tag: String,
  pub previous: Option<String>,
  /// Entries copied into the new generation from older ones
  pub carried_forward: usize,
  /// Generations deleted after the switch
  pub removed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
  Activated(ActivationReport),
  /// Installed; an older generation keeps serving until `promote`
  Waiting { tag: String },
  AlreadyCurrent { tag: String },
}

pub struct GenerationManager {
  cache: ContentCache,
  transport: Arc<dyn Transport>,
  origin: Url,
  static_prefixes: Vec<String>,
  precache: Vec<String>,
  auto_promote: bool,
  events: Option<EventSender>,
}

impl GenerationManager {
  pub fn new(
    config: &Config,
    origin: Url,
    cache: ContentCache,
    transport: Arc<dyn Transport>,
  ) -> Self {
    Self {
      cache,
      transport,
      origin,
      static_prefixes: config.cache.static_prefixes.clone(),
      precache: config.cache.precache.clone(),
      auto_promote: config.cache.auto_promote,
      events: None,
    }
  }

  pub fn with_events(mut self, events: EventSender) -> Self {
    self.events = Some(events);
    self
  }

  pub fn cache(&self) -> &ContentCache {
    &self.cache
  }

  /// Register `tag`, precache into it, and activate it when nothing else
  /// is serving (or auto-promotion is on).
  pub async fn install(&self, tag: &str) -> Result<InstallOutcome> {
    let current = self.cache.current_generation().await?;
    if current.as_deref() == Some(tag) {
      return Ok(InstallOutcome::AlreadyCurrent {
        tag: tag.to_string(),
      });
    }

    let newly_seen = self.cache.register(tag).await?;
    info!(tag, newly_seen, "installing generation");

    if let Err(e) = self.precache_into(tag).await {
      // A half-filled generation must never become current
      if let Err(drop_err) = self.cache.drop_generation(tag).await {
        warn!(tag, error = %drop_err, "failed to discard incomplete generation");
      }
      return Err(e);
    }

    if current.is_none() || self.auto_promote {
      let report = self.activate(tag).await?;
      return Ok(InstallOutcome::Activated(report));
    }

    info!(tag, "generation waiting for promotion");
    self.emit(Event::UpdateWaiting {
      tag: tag.to_string(),
    });
    Ok(InstallOutcome::Waiting {
      tag: tag.to_string(),
    })
  }

  /// Activate the newest waiting generation.
  pub async fn promote(&self) -> Result<ActivationReport> {
    let tag = self
      .cache
      .newest_pending()
      .await?
      .ok_or_else(|| eyre!("No generation is waiting for promotion"))?;
    self.activate(&tag).await
  }

  /// Make `tag` current, carry static assets forward and delete every other
  /// generation.
  pub async fn activate(&self, tag: &str) -> Result<ActivationReport> {
    let previous = self.cache.make_current(tag).await?;

    let mut carried_forward = 0;
    let mut removed = Vec::new();
    for old in self.cache.generations().await? {
      if old.tag == tag {
        continue;
      }

      match self
        .cache
        .copy_forward(&old.tag, tag, &self.static_prefixes)
        .await
      {
        Ok(copied) => carried_forward += copied,
        Err(e) => warn!(from = %old.tag, to = tag, error = %e, "copy-forward failed"),
      }

      match self.cache.drop_generation(&old.tag).await {
        Ok(entries) => {
          info!(tag = %old.tag, entries, "deleted old generation");
          removed.push(old.tag);
        }
        Err(e) => warn!(tag = %old.tag, error = %e, "failed to delete old generation"),
      }
    }

    info!(tag, carried_forward, ?removed, "generation activated");
    self.emit(Event::GenerationActivated {
      tag: tag.to_string(),
      carried_forward,
      removed: removed.clone(),
    });

    Ok(ActivationReport {
      tag: tag.to_string(),
      previous,
      carried_forward,
      removed,
    })
  }

  async fn precache_into(&self, tag: &str) -> Result<()> {
    for entry in &self.precache {
      let url = self
        .origin
        .join(entry)
        .map_err(|e| eyre!("Invalid precache entry {}: {}", entry, e))?;

      let response = self
        .transport
        .send(RemoteRequest::get(url.clone()))
        .await
        .map_err(|e| eyre!("Failed to precache {}: {}", url, e))?;
      if !response.is_success() {
        return Err(eyre!(
          "Failed to precache {}: status {}",
          url,
          response.status
        ));
      }

      self
        .cache
        .put(tag, &RequestKey::get(&url), &response)
        .await?;
    }
    Ok(())
  }

  fn emit(&self, event: Event) {
    if let Some(tx) = &self.events {
      let _ = tx.send(event);
    }
  }
}
