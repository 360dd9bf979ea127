use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::paths;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin the app is served from, e.g. `https://host:44300`
  pub origin: String,
  /// Path prefixes stripped before a request is matched against the
  /// tracked collection (service roots, reverse-proxy mounts)
  #[serde(default)]
  pub deployment_prefixes: Vec<String>,
  pub tracked: TrackedConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub replay: ReplayConfig,
  #[serde(default)]
  pub network: NetworkConfig,
  /// Where the local database and logs live (defaults to the XDG data dir)
  pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackedConfig {
  /// Collection path, with or without a deployment prefix
  pub collection: String,
  /// Unique-key field used for single-entity lookups
  #[serde(default = "default_key_field")]
  pub key_field: String,
}

fn default_key_field() -> String {
  "Username".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Current generation tag; bump it on every deploy
  #[serde(default = "default_generation")]
  pub generation: String,
  /// Paths served cache-first and carried across generations
  #[serde(default = "default_static_prefixes")]
  pub static_prefixes: Vec<String>,
  /// URLs fetched into a generation when it is installed
  #[serde(default)]
  pub precache: Vec<String>,
  /// Document served for failed navigations when the exact page is not cached
  pub navigation_fallback: Option<String>,
  /// Activate a newly installed generation without waiting for `promote`
  #[serde(default)]
  pub auto_promote: bool,
}

fn default_generation() -> String {
  "offline-cache-v1".to_string()
}

fn default_static_prefixes() -> Vec<String> {
  vec!["/resources/".to_string(), "/test-resources/".to_string()]
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      generation: default_generation(),
      static_prefixes: default_static_prefixes(),
      precache: Vec::new(),
      navigation_fallback: None,
      auto_promote: false,
    }
  }
}

/// HTTP method used when replaying a queued update.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMethod {
  #[default]
  Put,
  Patch,
  /// POST with `X-HTTP-Method: MERGE`, for v2 services
  Merge,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplayConfig {
  #[serde(default)]
  pub update_method: UpdateMethod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
  30
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      timeout_secs: default_timeout_secs(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offsync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/offsync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("offsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  /// Parse and validate a YAML document.
  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    config.origin_url()?;
    Ok(config)
  }

  pub fn origin_url(&self) -> Result<Url> {
    let url = Url::parse(&self.origin)
      .map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))?;
    if !matches!(url.scheme(), "http" | "https") {
      return Err(eyre!("Origin must be http or https: {}", self.origin));
    }
    Ok(url)
  }

  /// The tracked collection in normalized form; also its mirror key.
  pub fn tracked_collection(&self) -> String {
    paths::normalize(&self.tracked.collection, &self.deployment_prefixes)
  }
}
