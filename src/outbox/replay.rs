use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::build_request;
use super::queue::{MutationQueue, QueueItem};
use crate::config::UpdateMethod;
use crate::db::StoreError;
use crate::event::{Event, EventSender};
use crate::remote::Transport;

/// Result of one replay pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
  /// Ids acknowledged and removed, in order
  pub replayed: Vec<i64>,
  /// The item that failed; it and everything after it are still queued
  pub halted_at: Option<i64>,
  /// Items left in the queue after the pass
  pub remaining: usize,
  /// Another pass was already running; nothing was touched
  pub skipped: bool,
}

impl ReplayReport {
  pub fn already_running() -> Self {
    Self {
      skipped: true,
      ..Self::default()
    }
  }
}

/// Sends queued mutations in order, stopping at the first failure.
#[derive(Clone)]
pub struct Replayer {
  queue: MutationQueue,
  transport: Arc<dyn Transport>,
  origin: Url,
  update_method: UpdateMethod,
  running: Arc<Mutex<()>>,
  events: Option<EventSender>,
}

impl Replayer {
  pub fn new(
    queue: MutationQueue,
    transport: Arc<dyn Transport>,
    origin: Url,
    update_method: UpdateMethod,
  ) -> Self {
    Self {
      queue,
      transport,
      origin,
      update_method,
      running: Arc::new(Mutex::new(())),
      events: None,
    }
  }

  pub fn with_events(mut self, events: EventSender) -> Self {
    self.events = Some(events);
    self
  }

  /// Replay the queue front to back.
  ///
  /// Each item is removed only after the backend acknowledged it with a 2xx.
  /// Any other outcome halts the pass with that item still at the head.
  pub async fn replay(&self) -> Result<ReplayReport, StoreError> {
    let Ok(_guard) = self.running.try_lock() else {
      debug!("replay already in progress");
      return Ok(ReplayReport::already_running());
    };

    let items = self.queue.items().await?;
    if items.is_empty() {
      return Ok(ReplayReport::default());
    }
    info!(pending = items.len(), "replaying queued mutations");

    let mut report = ReplayReport::default();
    for item in items {
      match self.send(&item).await {
        Ok(()) => {
          self.queue.remove(item.id).await?;
          debug!(id = item.id, "queued mutation acknowledged");
          self.emit(Event::Replayed { id: item.id });
          report.replayed.push(item.id);
        }
        Err(reason) => {
          warn!(id = item.id, %reason, "replay halted");
          self.emit(Event::ReplayHalted {
            id: item.id,
            reason,
          });
          report.halted_at = Some(item.id);
          break;
        }
      }
    }

    report.remaining = self.queue.len().await?;
    info!(
      replayed = report.replayed.len(),
      remaining = report.remaining,
      "replay finished"
    );
    Ok(report)
  }

  async fn send(&self, item: &QueueItem) -> Result<(), String> {
    let request = build_request(
      &self.origin,
      item.kind,
      &item.target_path,
      item.payload.as_ref(),
      self.update_method,
    )
    .map_err(|e| e.to_string())?;

    match self.transport.send(request).await {
      Ok(response) if response.is_success() => Ok(()),
      Ok(response) => Err(format!("backend answered {}", response.status)),
      Err(e) => Err(e.to_string()),
    }
  }

  fn emit(&self, event: Event) {
    if let Some(tx) = &self.events {
      let _ = tx.send(event);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::Database;
  use crate::event::EventHandler;
  use crate::outbox::OperationKind;
  use crate::remote::Method;
  use crate::testing::FakeTransport;
  use serde_json::json;
  use std::time::Duration;

  fn setup() -> (Replayer, MutationQueue, Arc<FakeTransport>) {
    let queue = MutationQueue::new(Database::open_in_memory().unwrap());
    let transport = Arc::new(FakeTransport::new());
    let origin = Url::parse("https://h/").unwrap();
    let replayer = Replayer::new(queue.clone(), transport.clone(), origin, UpdateMethod::Put);
    (replayer, queue, transport)
  }

  #[tokio::test]
  async fn test_replay_preserves_order_despite_slow_responses() {
    let (replayer, queue, transport) = setup();
    // The first item answers slowest; the second must still wait for it
    transport.respond_after(Method::POST, "/users", 201, "", Duration::from_millis(60));
    transport.respond_after(Method::PUT, "/users('a')", 204, "", Duration::from_millis(5));
    transport.respond(Method::DELETE, "/users('b')", 204, "");

    queue
      .enqueue(OperationKind::Create, "/users", Some(json!({"Username": "a"})))
      .await
      .unwrap();
    queue
      .enqueue(OperationKind::Update, "/users('a')", Some(json!({"Age": 1})))
      .await
      .unwrap();
    queue
      .enqueue(OperationKind::Delete, "/users('b')", None)
      .await
      .unwrap();

    let report = replayer.replay().await.unwrap();
    assert_eq!(report.replayed.len(), 3);
    assert_eq!(report.remaining, 0);
    assert_eq!(
      transport.calls(),
      vec!["POST /users", "PUT /users('a')", "DELETE /users('b')"]
    );
    assert_eq!(
      transport.bodies(),
      vec![
        Some(br#"{"Username":"a"}"#.to_vec()),
        Some(br#"{"Age":1}"#.to_vec()),
        None
      ]
    );
  }

  #[tokio::test]
  async fn test_failure_halts_and_keeps_tail() {
    let (replayer, queue, transport) = setup();
    let mut events = EventHandler::new();
    let replayer = replayer.with_events(events.sender());
    transport.respond(Method::POST, "/users", 201, "");
    transport.respond(Method::PUT, "/users('a')", 500, "");

    let first = queue.enqueue(OperationKind::Create, "/users", None).await.unwrap();
    let second = queue
      .enqueue(OperationKind::Update, "/users('a')", None)
      .await
      .unwrap();
    let third = queue
      .enqueue(OperationKind::Delete, "/users('a')", None)
      .await
      .unwrap();

    let report = replayer.replay().await.unwrap();
    assert_eq!(report.replayed, vec![first.id]);
    assert_eq!(report.halted_at, Some(second.id));
    assert_eq!(report.remaining, 2);

    let ids: Vec<_> = queue.items().await.unwrap().iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![second.id, third.id]);
    // DELETE was never attempted
    assert_eq!(transport.calls().len(), 2);
    assert!(matches!(
      events.drain().as_slice(),
      [Event::Replayed { .. }, Event::ReplayHalted { id, .. }] if *id == second.id
    ));
  }

  #[tokio::test]
  async fn test_network_failure_halts_at_head() {
    let (replayer, queue, transport) = setup();
    transport.set_unreachable(true);
    let item = queue.enqueue(OperationKind::Delete, "/users('a')", None).await.unwrap();

    let report = replayer.replay().await.unwrap();
    assert_eq!(report.halted_at, Some(item.id));
    assert_eq!(queue.len().await.unwrap(), 1);
  }

  #[tokio::test]
  async fn test_empty_queue_is_a_no_op() {
    let (replayer, _, transport) = setup();
    assert_eq!(replayer.replay().await.unwrap(), ReplayReport::default());
    assert_eq!(replayer.replay().await.unwrap(), ReplayReport::default());
    assert!(transport.calls().is_empty());
  }

  #[tokio::test]
  async fn test_concurrent_replay_runs_once() {
    let (replayer, queue, transport) = setup();
    transport.respond_after(Method::DELETE, "/users('a')", 204, "", Duration::from_millis(50));
    queue.enqueue(OperationKind::Delete, "/users('a')", None).await.unwrap();

    let (a, b) = tokio::join!(replayer.replay(), replayer.replay());
    let reports = [a.unwrap(), b.unwrap()];
    assert_eq!(reports.iter().filter(|r| r.skipped).count(), 1);
    assert_eq!(reports.iter().map(|r| r.replayed.len()).sum::<usize>(), 1);
    assert_eq!(transport.calls(), vec!["DELETE /users('a')"]);
  }
}
