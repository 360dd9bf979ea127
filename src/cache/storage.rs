//! SQLite-backed content cache, partitioned by generation.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use super::traits::{CachedResponse, RequestKey};
use crate::db::{Database, StoreError};
use crate::mirror::parse_datetime;
use crate::remote::RemoteResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
  /// Installed, waiting for activation
  Pending,
  /// Serving requests; at most one
  Current,
  /// Superseded, about to be deleted
  Stale,
}

impl GenerationState {
  fn parse(s: &str) -> Self {
    match s {
      "current" => Self::Current,
      "pending" => Self::Pending,
      _ => Self::Stale,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
  pub tag: String,
  pub state: GenerationState,
  pub first_seen: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ContentCache {
  db: Database,
}

impl ContentCache {
  pub fn new(db: Database) -> Self {
    Self { db }
  }

  pub async fn current_generation(&self) -> Result<Option<String>, StoreError> {
    self
      .db
      .call(|conn| {
        Ok(
          conn
            .query_row(
              "SELECT tag FROM generations WHERE state = 'current'",
              [],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await
  }

  /// All known generations, oldest first.
  pub async fn generations(&self) -> Result<Vec<Generation>, StoreError> {
    let rows: Vec<(String, String, String)> = self
      .db
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT tag, state, first_seen FROM generations ORDER BY rowid")?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
          .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(tag, state, first_seen)| {
        Ok(Generation {
          tag,
          state: GenerationState::parse(&state),
          first_seen: parse_datetime(&first_seen)?,
        })
      })
      .collect()
  }

  /// Record `tag` as pending. Returns false if the tag was already known.
  pub async fn register(&self, tag: &str) -> Result<bool, StoreError> {
    let tag = tag.to_string();
    self
      .db
      .call(move |conn| {
        let inserted = conn.execute(
          "INSERT OR IGNORE INTO generations (tag, state) VALUES (?, 'pending')",
          params![tag],
        )?;
        Ok(inserted == 1)
      })
      .await
  }

  /// Most recently registered generation still waiting for activation.
  pub async fn newest_pending(&self) -> Result<Option<String>, StoreError> {
    self
      .db
      .call(|conn| {
        Ok(
          conn
            .query_row(
              "SELECT tag FROM generations WHERE state = 'pending' ORDER BY rowid DESC LIMIT 1",
              [],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await
  }

  /// Make `tag` the only current generation and return the one it replaced.
  ///
  /// Demotion and promotion happen in one transaction, so there is never a
  /// moment with two current generations.
  pub async fn make_current(&self, tag: &str) -> Result<Option<String>, StoreError> {
    let tag = tag.to_string();
    self
      .db
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let previous: Option<String> = tx
          .query_row(
            "SELECT tag FROM generations WHERE state = 'current'",
            [],
            |row| row.get(0),
          )
          .optional()?;

        if previous.as_deref() != Some(tag.as_str()) {
          tx.execute(
            "UPDATE generations SET state = 'stale' WHERE state = 'current'",
            [],
          )?;
          tx.execute(
            "INSERT INTO generations (tag, state, activated_at) VALUES (?1, 'current', datetime('now'))
             ON CONFLICT(tag) DO UPDATE SET state = 'current', activated_at = datetime('now')",
            params![tag],
          )?;
        }

        tx.commit()?;
        Ok(previous)
      })
      .await
  }

  pub async fn lookup(
    &self,
    generation: &str,
    key: &RequestKey,
  ) -> Result<Option<CachedResponse>, StoreError> {
    let tag = generation.to_string();
    let hash = key.hash();

    let row: Option<(String, u16, String, Vec<u8>, String)> = self
      .db
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT request_key, status, headers, body, stored_at FROM content_cache
               WHERE generation = ? AND request_hash = ?",
              params![tag, hash],
              |row| {
                Ok((
                  row.get(0)?,
                  row.get(1)?,
                  row.get(2)?,
                  row.get(3)?,
                  row.get(4)?,
                ))
              },
            )
            .optional()?,
        )
      })
      .await?;

    let Some((request_key, status, headers, body, stored_at)) = row else {
      return Ok(None);
    };

    Ok(Some(CachedResponse {
      generation: generation.to_string(),
      request_key,
      status,
      headers: serde_json::from_str(&headers)?,
      body,
      stored_at: parse_datetime(&stored_at)?,
    }))
  }

  /// Store `response` for `key` in `generation`, replacing any earlier entry.
  pub async fn put(
    &self,
    generation: &str,
    key: &RequestKey,
    response: &RemoteResponse,
  ) -> Result<(), StoreError> {
    let generation = generation.to_string();
    let hash = key.hash();
    let request_key = key.as_str().to_string();
    let path = key.path().to_string();
    let status = response.status;
    let headers = serde_json::to_string(&response.headers)?;
    let body = response.body.clone();

    self
      .db
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO content_cache
             (generation, request_hash, request_key, path, status, headers, body, stored_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
          params![generation, hash, request_key, path, status, headers, body],
        )?;
        Ok(())
      })
      .await
  }

  /// Copy entries under any of `prefixes` from one generation to another.
  /// Entries the target already has are left alone.
  pub async fn copy_forward(
    &self,
    from: &str,
    to: &str,
    prefixes: &[String],
  ) -> Result<usize, StoreError> {
    let from = from.to_string();
    let to = to.to_string();
    let prefixes = prefixes.to_vec();

    self
      .db
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut copied = 0;
        for prefix in &prefixes {
          copied += tx.execute(
            "INSERT OR IGNORE INTO content_cache
               (generation, request_hash, request_key, path, status, headers, body, stored_at)
             SELECT ?1, request_hash, request_key, path, status, headers, body, stored_at
             FROM content_cache
             WHERE generation = ?2 AND substr(path, 1, length(?3)) = ?3",
            params![to, from, prefix],
          )?;
        }
        tx.commit()?;
        Ok(copied)
      })
      .await
  }

  /// Delete a generation and every entry in it. Returns the entry count.
  pub async fn drop_generation(&self, tag: &str) -> Result<usize, StoreError> {
    let tag = tag.to_string();
    self
      .db
      .call(move |conn| {
        let tx = conn.transaction()?;
        let removed = tx.execute(
          "DELETE FROM content_cache WHERE generation = ?",
          params![tag],
        )?;
        tx.execute("DELETE FROM generations WHERE tag = ?", params![tag])?;
        tx.commit()?;
        Ok(removed)
      })
      .await
  }

  pub async fn entry_count(&self, generation: &str) -> Result<usize, StoreError> {
    let generation = generation.to_string();
    self
      .db
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM content_cache WHERE generation = ?",
          params![generation],
          |row| row.get(0),
        )?)
      })
      .await
  }
}
