use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cache::SqliteStorage;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub remote: RemoteConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  /// Stamped as `created_by` on new items and categories
  pub user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
  /// Base URL of the backend project, e.g. https://abc.supabase.co
  pub url: String,
  /// Upper bound for a single remote call
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  /// Explicit database file; defaults to one file per remote URL
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// How often `watch` checks whether the remote is reachable
  #[serde(default = "default_probe_interval_secs")]
  pub probe_interval_secs: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      probe_interval_secs: default_probe_interval_secs(),
    }
  }
}

fn default_timeout_secs() -> u64 {
  15
}

fn default_probe_interval_secs() -> u64 {
  30
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./ndomog.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/ndomog/config.yaml
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
        "No configuration file found. Create one at ~/.config/ndomog/config.yaml\n\
                 with at least `remote: {{ url: https://<project>.supabase.co }}`."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("ndomog.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("ndomog").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;

    if config.remote.url.trim().is_empty() {
      return Err(eyre!("remote.url must not be empty"));
    }

    Ok(config)
  }

  /// Location of the local cache database.
  pub fn cache_path(&self) -> Result<PathBuf> {
    match &self.cache.path {
      Some(path) => Ok(path.clone()),
      None => SqliteStorage::default_path(&self.remote.url),
    }
  }

  /// Get the backend API key from environment variables.
  ///
  /// Checks NDOMOG_API_KEY first, then SUPABASE_ANON_KEY as fallback.
  pub fn get_api_key() -> Result<String> {
    std::env::var("NDOMOG_API_KEY")
      .or_else(|_| std::env::var("SUPABASE_ANON_KEY"))
      .map_err(|_| {
        eyre!("API key not found. Set NDOMOG_API_KEY or SUPABASE_ANON_KEY environment variable.")
      })
  }

  /// Signed-in user's access token, if one was provided.
  ///
  /// Checks NDOMOG_ACCESS_TOKEN.
  pub fn get_access_token() -> Option<String> {
    std::env::var("NDOMOG_ACCESS_TOKEN").ok()
  }
}
