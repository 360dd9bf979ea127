use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use super::queue::{MutationQueue, OperationKind, QueueItem};
use super::{build_request, OutboxError};
use crate::config::UpdateMethod;
use crate::reachability::Reachability;
use crate::remote::{RemoteResponse, Transport};

#[derive(Debug, Clone, PartialEq)]
pub enum Submitted {
  /// The backend answered; the response is passed through unchanged
  Completed(RemoteResponse),
  /// Stored for replay once the backend is reachable again
  Queued(QueueItem),
}

/// Write path for mutations against the backend.
#[derive(Clone)]
pub struct OfflineWriter {
  queue: MutationQueue,
  transport: Arc<dyn Transport>,
  reachability: Reachability,
  origin: Url,
  update_method: UpdateMethod,
}

impl OfflineWriter {
  pub fn new(
    queue: MutationQueue,
    transport: Arc<dyn Transport>,
    reachability: Reachability,
    origin: Url,
    update_method: UpdateMethod,
  ) -> Self {
    Self {
      queue,
      transport,
      reachability,
      origin,
      update_method,
    }
  }

  /// Send the mutation now, or queue it when the backend cannot be reached.
  ///
  /// Only network-classified failures are queued. A backend rejection comes
  /// back as `Completed` and is never retried.
  pub async fn submit(
    &self,
    kind: OperationKind,
    target_path: &str,
    payload: Option<Value>,
  ) -> Result<Submitted, OutboxError> {
    if !self.reachability.is_online() {
      debug!(kind = %kind, path = target_path, "offline, queueing mutation");
      let item = self.queue.enqueue(kind, target_path, payload).await?;
      return Ok(Submitted::Queued(item));
    }

    let request = build_request(
      &self.origin,
      kind,
      target_path,
      payload.as_ref(),
      self.update_method,
    )?;

    match self.transport.send(request).await {
      Ok(response) if !response.is_network_classified() => Ok(Submitted::Completed(response)),
      Ok(response) => {
        info!(status = response.status, path = target_path, "backend unreachable, queueing");
        let item = self.queue.enqueue(kind, target_path, payload).await?;
        Ok(Submitted::Queued(item))
      }
      Err(e) if e.is_network_classified() => {
        info!(error = %e, path = target_path, "network failure, queueing");
        let item = self.queue.enqueue(kind, target_path, payload).await?;
        Ok(Submitted::Queued(item))
      }
      Err(e) => Err(e.into()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::Database;
  use crate::remote::Method;
  use crate::testing::FakeTransport;
  use serde_json::json;

  fn writer(online: bool) -> (OfflineWriter, MutationQueue, Arc<FakeTransport>) {
    let queue = MutationQueue::new(Database::open_in_memory().unwrap());
    let transport = Arc::new(FakeTransport::new());
    let writer = OfflineWriter::new(
      queue.clone(),
      transport.clone(),
      Reachability::new(online),
      Url::parse("https://h/").unwrap(),
      UpdateMethod::Put,
    );
    (writer, queue, transport)
  }

  #[tokio::test]
  async fn test_offline_submit_never_touches_network() {
    let (writer, queue, transport) = writer(false);
    let submitted = writer
      .submit(OperationKind::Create, "/users", Some(json!({"Username": "eve"})))
      .await
      .unwrap();

    assert!(matches!(submitted, Submitted::Queued(ref item) if item.target_path == "/users"));
    assert!(transport.calls().is_empty());
    assert_eq!(queue.len().await.unwrap(), 1);
  }

  #[tokio::test]
  async fn test_online_success_passes_through() {
    let (writer, queue, transport) = writer(true);
    transport.respond(Method::PUT, "/users('a')", 204, "");
    let submitted = writer
      .submit(OperationKind::Update, "/users('a')", Some(json!({"Age": 4})))
      .await
      .unwrap();

    assert!(matches!(submitted, Submitted::Completed(ref r) if r.status == 204));
    assert!(queue.is_empty().await.unwrap());
  }

  #[tokio::test]
  async fn test_network_classified_failures_are_queued() {
    let (writer, queue, transport) = writer(true);
    transport.respond(Method::DELETE, "/users('a')", 503, "");
    let submitted = writer
      .submit(OperationKind::Delete, "/users('a')", None)
      .await
      .unwrap();
    assert!(matches!(submitted, Submitted::Queued(_)));

    transport.set_unreachable(true);
    writer
      .submit(OperationKind::Delete, "/users('b')", None)
      .await
      .unwrap();
    assert_eq!(queue.len().await.unwrap(), 2);
  }

  #[tokio::test]
  async fn test_backend_rejection_is_not_queued() {
    let (writer, queue, transport) = writer(true);
    transport.respond(Method::POST, "/users", 400, "bad request");
    let submitted = writer
      .submit(OperationKind::Create, "/users", Some(json!({})))
      .await
      .unwrap();

    assert!(matches!(submitted, Submitted::Completed(ref r) if r.status == 400));
    assert!(queue.is_empty().await.unwrap());
  }

  #[tokio::test]
  async fn test_queue_write_failure_is_an_error() {
    let db = Database::open_in_memory().unwrap();
    let queue = MutationQueue::new(db.clone());
    let transport = Arc::new(FakeTransport::new());
    transport.set_unreachable(true);
    let writer = OfflineWriter::new(
      queue,
      transport,
      Reachability::new(true),
      Url::parse("https://h/").unwrap(),
      UpdateMethod::Put,
    );
    db.call(|conn| Ok(conn.execute_batch("DROP TABLE mutation_queue")?))
      .await
      .unwrap();

    let result = writer.submit(OperationKind::Delete, "/users('a')", None).await;
    assert!(matches!(result, Err(OutboxError::Store(_))));

    // Offline submits hit the same wall
    writer.reachability.set(false);
    let result = writer.submit(OperationKind::Delete, "/users('a')", None).await;
    assert!(matches!(result, Err(OutboxError::Store(_))));
  }
}
