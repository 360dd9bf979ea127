//! Local mirror of the tracked collection.
//!
//! Holds the last full snapshot per resource key. A snapshot is replaced
//! wholesale on every successful full read and never merged.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};

use crate::db::{Database, StoreError};
use crate::envelope::Envelope;

/// A stored snapshot and when it was taken.
#[derive(Debug, Clone)]
pub struct Snapshot {
  pub envelope: Envelope,
  pub stored_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct MirrorStore {
  db: Database,
}

impl MirrorStore {
  pub fn new(db: Database) -> Self {
    Self { db }
  }

  /// Replace the snapshot for `resource_key` with `envelope`.
  pub async fn replace(&self, resource_key: &str, envelope: &Envelope) -> Result<(), StoreError> {
    let key = resource_key.to_string();
    let data = serde_json::to_vec(envelope)?;
    let count = envelope.results.len();

    self
      .db
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
          "INSERT OR REPLACE INTO mirror_snapshots (resource_key, envelope, record_count, stored_at)
           VALUES (?, ?, ?, datetime('now'))",
          params![key, data, count],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    info!(resource_key, records = count, "Mirror snapshot replaced");
    Ok(())
  }

  /// Read the snapshot for `resource_key`, if one was ever stored.
  ///
  /// The row is read inside a single read transaction, so a concurrent
  /// [`MirrorStore::replace`] is observed either entirely or not at all.
  pub async fn snapshot(&self, resource_key: &str) -> Result<Option<Snapshot>, StoreError> {
    let key = resource_key.to_string();

    let row: Option<(Vec<u8>, String)> = self
      .db
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let row = tx
          .query_row(
            "SELECT envelope, stored_at FROM mirror_snapshots WHERE resource_key = ?",
            params![key],
            |row| Ok((row.get(0)?, row.get(1)?)),
          )
          .optional()?;
        tx.commit()?;
        Ok(row)
      })
      .await?;

    let Some((data, stored_at)) = row else {
      debug!(resource_key, "No mirror snapshot");
      return Ok(None);
    };

    Ok(Some(Snapshot {
      envelope: serde_json::from_slice(&data)?,
      stored_at: parse_datetime(&stored_at)?,
    }))
  }
}

/// Parse a datetime string from SQLite format.
pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| StoreError::Unavailable(format!("bad timestamp '{}': {}", s, e)))
}
