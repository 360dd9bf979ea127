pub mod schema;

use color_eyre::{eyre::eyre, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Failures of the local store.
///
/// Every variant means the same thing to callers: the durable state could not
/// be read or written. Readers degrade, writers reject.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("local store unavailable: {0}")]
  Unavailable(String),
  #[error("local store transaction failed: {0}")]
  Sqlite(#[from] rusqlite::Error),
  #[error("stored value is corrupt: {0}")]
  Corrupt(#[from] serde_json::Error),
}

/// Shared handle to the engine's SQLite database.
///
/// Cloning is cheap; all clones refer to the same connection. Each call to
/// [`Database::call`] holds the connection for exactly one closure on a
/// blocking thread, so async callers never stall the runtime.
#[derive(Clone)]
pub struct Database {
  conn: Arc<Mutex<Connection>>,
}

impl Database {
  /// Open or create the database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;
    conn
      .pragma_update(None, "journal_mode", "WAL")
      .map_err(|e| eyre!("Failed to enable WAL journal: {}", e))?;

    Self::from_connection(conn)
  }

  /// Open a private in-memory database. Used by tests and dry runs.
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    conn
      .pragma_update(None, "foreign_keys", "ON")
      .map_err(|e| eyre!("Failed to enable foreign keys: {}", e))?;
    conn
      .busy_timeout(std::time::Duration::from_secs(5))
      .map_err(|e| eyre!("Failed to set busy timeout: {}", e))?;

    let db = Self {
      conn: Arc::new(Mutex::new(conn)),
    };
    db.run_migrations()?;

    Ok(db)
  }

  /// Get the default database path
  pub fn default_path(data_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = data_dir {
      return Ok(dir.join("offsync.db"));
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("offsync").join("offsync.db"))
  }

  /// Run database migrations
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(schema::SCHEMA)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;
    Ok(())
  }

  /// Run `f` against the connection on the blocking pool.
  ///
  /// The lock is taken when the closure starts and released when it returns,
  /// whatever the outcome.
  pub async fn call<F, R>(&self, f: F) -> Result<R, StoreError>
  where
    F: FnOnce(&mut Connection) -> Result<R, StoreError> + Send + 'static,
    R: Send + 'static,
  {
    let conn = Arc::clone(&self.conn);
    tokio::task::spawn_blocking(move || {
      let mut guard = conn
        .lock()
        .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))?;
      f(&mut guard)
    })
    .await
    .map_err(|e| StoreError::Unavailable(format!("store task failed: {}", e)))?
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_migrations_are_idempotent() {
    let db = Database::open_in_memory().unwrap();
    db.run_migrations().unwrap();

    let tables: Vec<String> = db
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let names = stmt
          .query_map([], |row| row.get(0))?
          .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
      })
      .await
      .unwrap();

    for expected in [
      "content_cache",
      "generations",
      "mirror_snapshots",
      "mutation_queue",
    ] {
      assert!(tables.iter().any(|t| t == expected), "missing {}", expected);
    }
  }

  #[tokio::test]
  async fn test_only_one_current_generation_allowed() {
    let db = Database::open_in_memory().unwrap();
    let result = db
      .call(|conn| {
        conn.execute(
          "INSERT INTO generations (tag, state) VALUES ('v1', 'current')",
          [],
        )?;
        conn.execute(
          "INSERT INTO generations (tag, state) VALUES ('v2', 'current')",
          [],
        )?;
        Ok(())
      })
      .await;

    assert!(matches!(result, Err(StoreError::Sqlite(_))));
  }

  #[test]
  fn test_default_path_uses_data_dir_override() {
    let path = Database::default_path(Some(Path::new("/tmp/offsync-test"))).unwrap();
    assert_eq!(path, PathBuf::from("/tmp/offsync-test/offsync.db"));
  }

  #[tokio::test]
  async fn test_file_backed_database_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("store.db");

    {
      let db = Database::open(&path).unwrap();
      db.call(|conn| {
        conn.execute(
          "INSERT INTO generations (tag, state) VALUES ('v1', 'pending')",
          [],
        )?;
        Ok(())
      })
      .await
      .unwrap();
    }

    let db = Database::open(&path).unwrap();
    let count: i64 = db
      .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM generations", [], |r| r.get(0))?))
      .await
      .unwrap();
    assert_eq!(count, 1);
  }
}
