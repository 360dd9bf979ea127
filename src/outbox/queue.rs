use chrono::{DateTime, Utc};
use rusqlite::{params, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::info;

use crate::db::{Database, StoreError};
use crate::event::{Event, EventSender};
use crate::mirror::parse_datetime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
  Create,
  Update,
  Delete,
}

impl OperationKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Create => "create",
      Self::Update => "update",
      Self::Delete => "delete",
    }
  }
}

impl fmt::Display for OperationKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for OperationKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "create" => Ok(Self::Create),
      "update" => Ok(Self::Update),
      "delete" => Ok(Self::Delete),
      other => Err(format!(
        "unknown operation '{}', expected create, update or delete",
        other
      )),
    }
  }
}

/// A mutation waiting to be replayed against the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
  /// Strictly increasing, never reused
  pub id: i64,
  pub kind: OperationKind,
  pub target_path: String,
  pub payload: Option<Value>,
  pub enqueued_at: DateTime<Utc>,
}

/// Durable FIFO of offline mutations.
#[derive(Clone)]
pub struct MutationQueue {
  db: Database,
  events: Option<EventSender>,
}

impl MutationQueue {
  pub fn new(db: Database) -> Self {
    Self { db, events: None }
  }

  pub fn with_events(mut self, events: EventSender) -> Self {
    self.events = Some(events);
    self
  }

  /// Persist a mutation. The item is durable once this returns `Ok`.
  pub async fn enqueue(
    &self,
    kind: OperationKind,
    target_path: &str,
    payload: Option<Value>,
  ) -> Result<QueueItem, StoreError> {
    let stamp = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let enqueued_at = parse_datetime(&stamp)?;
    let body = payload.as_ref().map(serde_json::to_vec).transpose()?;
    let path = target_path.to_string();

    let id = self
      .db
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
          "INSERT INTO mutation_queue (kind, target_path, payload, enqueued_at)
           VALUES (?, ?, ?, ?)",
          params![kind.as_str(), path, body, stamp],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
      })
      .await?;

    let item = QueueItem {
      id,
      kind,
      target_path: target_path.to_string(),
      payload,
      enqueued_at,
    };
    info!(id, kind = %kind, path = target_path, "mutation queued");
    self.emit(Event::Queued(item.clone()));
    Ok(item)
  }

  /// Pending items, oldest first.
  pub async fn items(&self) -> Result<Vec<QueueItem>, StoreError> {
    type Row = (i64, String, String, Option<Vec<u8>>, String);

    let rows: Vec<Row> = self
      .db
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT id, kind, target_path, payload, enqueued_at
           FROM mutation_queue ORDER BY id ASC",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
          })?
          .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(id, kind, target_path, payload, enqueued_at)| {
        let kind = kind
          .parse()
          .map_err(|e: String| StoreError::Unavailable(format!("queue item {}: {}", id, e)))?;
        Ok(QueueItem {
          id,
          kind,
          target_path,
          payload: payload
            .map(|bytes| serde_json::from_slice(&bytes))
            .transpose()?,
          enqueued_at: parse_datetime(&enqueued_at)?,
        })
      })
      .collect()
  }

  /// Remove an acknowledged item. Returns false if it was already gone.
  pub async fn remove(&self, id: i64) -> Result<bool, StoreError> {
    self
      .db
      .call(move |conn| {
        let removed = conn.execute("DELETE FROM mutation_queue WHERE id = ?", params![id])?;
        Ok(removed == 1)
      })
      .await
  }

  pub async fn len(&self) -> Result<usize, StoreError> {
    self
      .db
      .call(|conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM mutation_queue", [], |row| row.get(0))?)
      })
      .await
  }

  pub async fn is_empty(&self) -> Result<bool, StoreError> {
    Ok(self.len().await? == 0)
  }

  /// Re-announce every pending item, e.g. after a restart.
  pub async fn restore_notices(&self) -> Result<usize, StoreError> {
    let items = self.items().await?;
    let count = items.len();
    for item in items {
      self.emit(Event::Queued(item));
    }
    Ok(count)
  }

  fn emit(&self, event: Event) {
    if let Some(tx) = &self.events {
      let _ = tx.send(event);
    }
  }
}
