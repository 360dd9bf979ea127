use tokio::sync::mpsc;

use crate::outbox::QueueItem;

/// Engine events surfaced to the user as transient notices
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
  /// A mutation was stored for later replay
  Queued(QueueItem),
  /// A queued mutation was acknowledged by the backend and removed
  Replayed { id: i64 },
  /// Replay stopped at this item; it and everything after it stay queued
  ReplayHalted { id: i64, reason: String },
  /// A new generation is installed and waits for `promote`
  UpdateWaiting { tag: String },
  /// A generation became current and now serves all clients
  GenerationActivated {
    tag: String,
    carried_forward: usize,
    removed: Vec<String>,
  },
  /// The reachability signal changed
  Reachability { online: bool },
}

impl Event {
  /// One-line text for a toast or status bar.
  pub fn notice(&self) -> String {
    match self {
      Event::Queued(item) => format!(
        "Action queued (Offline): {} - {}",
        item.kind.as_str().to_uppercase(),
        item.target_path
      ),
      Event::Replayed { id } => format!("Queued action #{} synchronized", id),
      Event::ReplayHalted { id, reason } => {
        format!("Synchronization paused at action #{}: {}", id, reason)
      }
      Event::UpdateWaiting { tag } => format!("Update {} ready, promote to apply", tag),
      Event::GenerationActivated { tag, .. } => format!("Now running {}", tag),
      Event::Reachability { online: true } => "Back online".to_string(),
      Event::Reachability { online: false } => "Offline mode".to_string(),
    }
  }
}

pub type EventSender = mpsc::UnboundedSender<Event>;

/// Receiving end of the notice channel
pub struct EventHandler {
  tx: EventSender,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self { tx, rx }
  }

  /// Sender handed to the stores that emit notices
  pub fn sender(&self) -> EventSender {
    self.tx.clone()
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }

  /// Everything currently buffered, without waiting
  pub fn drain(&mut self) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = self.rx.try_recv() {
      events.push(event);
    }
    events
  }
}

impl Default for EventHandler {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::outbox::OperationKind;

  #[tokio::test]
  async fn test_events_arrive_in_order() {
    let mut handler = EventHandler::new();
    let tx = handler.sender();
    tx.send(Event::Reachability { online: false }).unwrap();
    tx.send(Event::Replayed { id: 4 }).unwrap();

    assert_eq!(handler.next().await, Some(Event::Reachability { online: false }));
    assert_eq!(handler.drain(), vec![Event::Replayed { id: 4 }]);
    assert!(handler.drain().is_empty());
  }

  #[test]
  fn test_queued_notice_text() {
    let item = QueueItem {
      id: 1,
      kind: OperationKind::Update,
      target_path: "/zi_denuser('bob')".to_string(),
      payload: None,
      enqueued_at: chrono::Utc::now(),
    };
    assert_eq!(
      Event::Queued(item).notice(),
      "Action queued (Offline): UPDATE - /zi_denuser('bob')"
    );
  }
}
