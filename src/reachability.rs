//! Online/offline signal and the task that replays the queue on reconnect.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::event::{Event, EventSender};
use crate::outbox::Replayer;

/// Shared reachability flag. Cloning shares the same signal.
#[derive(Clone)]
pub struct Reachability {
  tx: Arc<watch::Sender<bool>>,
}

impl Reachability {
  pub fn new(online: bool) -> Self {
    let (tx, _rx) = watch::channel(online);
    Self { tx: Arc::new(tx) }
  }

  /// Update the flag. Returns true if it actually changed.
  pub fn set(&self, online: bool) -> bool {
    self.tx.send_if_modified(|current| {
      if *current == online {
        false
      } else {
        *current = online;
        true
      }
    })
  }

  pub fn is_online(&self) -> bool {
    *self.tx.borrow()
  }

  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }
}

/// Runs replay passes in response to reachability changes.
///
/// A single task owns every pass it starts, so passes triggered by rapid
/// flapping run back to back instead of overlapping.
pub struct ReplayCoordinator;

impl ReplayCoordinator {
  pub fn spawn(
    replayer: Replayer,
    reachability: &Reachability,
    events: Option<EventSender>,
  ) -> JoinHandle<()> {
    let mut rx = reachability.subscribe();

    tokio::spawn(async move {
      if *rx.borrow_and_update() {
        run_pass(&replayer, "startup").await;
      }

      // `set` only notifies on change, so reading `true` here always follows
      // an offline edge, even one that flapped back during a pass.
      while rx.changed().await.is_ok() {
        let online = *rx.borrow_and_update();
        info!(online, "reachability changed");
        if let Some(tx) = &events {
          let _ = tx.send(Event::Reachability { online });
        }
        if online {
          run_pass(&replayer, "reconnect").await;
        }
      }
      debug!("reachability signal closed, coordinator stopping");
    })
  }
}

async fn run_pass(replayer: &Replayer, trigger: &str) {
  match replayer.replay().await {
    Ok(report) => debug!(trigger, ?report, "replay pass done"),
    Err(e) => error!(trigger, error = %e, "replay pass failed"),
  }
}
