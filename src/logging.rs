use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the log filter, e.g. `offsync=debug`
pub const LOG_ENV: &str = "OFFSYNC_LOG";

const LOG_FILE_PREFIX: &str = "offsync.log";

/// Directory the daily log files go to: next to the database.
pub fn log_dir(data_dir: Option<&Path>) -> Result<PathBuf> {
  let db_path = crate::db::Database::default_path(data_dir)?;
  db_path
    .parent()
    .map(|p| p.join("logs"))
    .ok_or_else(|| eyre!("Could not determine log directory"))
}

/// Install the global subscriber. Keep the guard alive until exit so
/// buffered lines reach the file.
pub fn init(dir: &Path, verbose: bool) -> Result<WorkerGuard> {
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
  let file_layer = fmt::layer().with_writer(writer).with_ansi(false);
  let stderr_layer = verbose.then(|| fmt::layer().with_writer(std::io::stderr));

  tracing_subscriber::registry()
    .with(filter)
    .with(file_layer)
    .with(stderr_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}
