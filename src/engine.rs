//! Wires the stores, the transport and the interceptor together.

use color_eyre::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::cache::{CacheLayer, ContentCache, GenerationManager};
use crate::config::Config;
use crate::db::Database;
use crate::event::EventSender;
use crate::intercept::Interceptor;
use crate::mirror::MirrorStore;
use crate::outbox::{MutationQueue, OfflineWriter, Replayer};
use crate::query::QueryEngine;
use crate::reachability::{Reachability, ReplayCoordinator};
use crate::remote::{HttpClient, Transport};

pub struct Engine {
  config: Config,
  reachability: Reachability,
  interceptor: Interceptor,
  generations: GenerationManager,
  query: QueryEngine,
  queue: MutationQueue,
  writer: OfflineWriter,
  replayer: Replayer,
  transport: Arc<dyn Transport>,
  events: EventSender,
}

impl Engine {
  /// Open the on-disk store and talk to the backend over HTTP.
  pub fn open(config: Config, online: bool, events: EventSender) -> Result<Self> {
    let path = Database::default_path(config.data_dir.as_deref())?;
    info!(path = %path.display(), "opening local store");
    let db = Database::open(&path)?;
    let transport: Arc<dyn Transport> = Arc::new(HttpClient::new(&config)?);
    Self::new(config, db, transport, online, events)
  }

  pub fn new(
    config: Config,
    db: Database,
    transport: Arc<dyn Transport>,
    online: bool,
    events: EventSender,
  ) -> Result<Self> {
    let origin = config.origin_url()?;
    let reachability = Reachability::new(online);

    let cache = ContentCache::new(db.clone());
    let mirror = MirrorStore::new(db.clone());
    let queue = MutationQueue::new(db).with_events(events.clone());

    let layer = CacheLayer::new(cache.clone(), Arc::clone(&transport));
    let interceptor = Interceptor::new(
      &config,
      origin.clone(),
      layer,
      mirror.clone(),
      reachability.clone(),
    );
    let generations =
      GenerationManager::new(&config, origin.clone(), cache, Arc::clone(&transport))
        .with_events(events.clone());
    let query = QueryEngine::new(mirror, config.tracked.key_field.clone());
    let writer = OfflineWriter::new(
      queue.clone(),
      Arc::clone(&transport),
      reachability.clone(),
      origin.clone(),
      config.replay.update_method,
    );
    let replayer = Replayer::new(
      queue.clone(),
      Arc::clone(&transport),
      origin,
      config.replay.update_method,
    )
    .with_events(events.clone());

    Ok(Self {
      config,
      reachability,
      interceptor,
      generations,
      query,
      queue,
      writer,
      replayer,
      transport,
      events,
    })
  }

  /// Startup work: re-announce mutations left queued by an earlier run.
  pub async fn start(&self) -> Result<usize> {
    let restored = self.queue.restore_notices().await?;
    if restored > 0 {
      info!(restored, "pending mutations restored from the queue");
    }
    Ok(restored)
  }

  /// Replay on startup and on every reconnect, until the engine is dropped.
  pub fn start_replay(&self) -> JoinHandle<()> {
    ReplayCoordinator::spawn(
      self.replayer.clone(),
      &self.reachability,
      Some(self.events.clone()),
    )
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn reachability(&self) -> &Reachability {
    &self.reachability
  }

  pub fn interceptor(&self) -> &Interceptor {
    &self.interceptor
  }

  pub fn generations(&self) -> &GenerationManager {
    &self.generations
  }

  pub fn query(&self) -> &QueryEngine {
    &self.query
  }

  pub fn queue(&self) -> &MutationQueue {
    &self.queue
  }

  pub fn writer(&self) -> &OfflineWriter {
    &self.writer
  }

  pub fn replayer(&self) -> &Replayer {
    &self.replayer
  }

  /// Direct network access, for requests the interceptor leaves alone.
  pub fn transport(&self) -> &Arc<dyn Transport> {
    &self.transport
  }
}
