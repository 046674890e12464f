use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::backend::Credentials;

/// Default lifetime of the cached category list
const DEFAULT_CATEGORIES_TTL_SECS: u64 = 300;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub backend: BackendConfig,
  #[serde(default)]
  pub dealership: DealershipConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
  /// Project URL, e.g. https://xyz.supabase.co
  pub url: String,
}

/// Which dealership the CLI acts for. `id` wins over `slug`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DealershipConfig {
  pub id: Option<String>,
  pub slug: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Snapshot database (defaults to the user data directory)
  pub path: Option<PathBuf>,
  #[serde(default = "default_categories_ttl")]
  pub categories_ttl_secs: u64,
  /// Leads stay cached for the whole session when unset
  pub leads_ttl_secs: Option<u64>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
      categories_ttl_secs: DEFAULT_CATEGORIES_TTL_SECS,
      leads_ttl_secs: None,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
  /// Write logs to this file instead of stderr
  pub file: Option<PathBuf>,
}

fn default_true() -> bool {
  true
}

fn default_categories_ttl() -> u64 {
  DEFAULT_CATEGORIES_TTL_SECS
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./lotcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/lotcache/config.yaml
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
        "No configuration file found. Create one at ~/.config/lotcache/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("lotcache.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("lotcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
    Self::parse(&contents).map_err(|e| eyre!("{} ({})", e, path.display()))
  }

  fn parse(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("Failed to parse config file: {}", e))
  }

  /// Backend credentials from environment variables.
  ///
  /// The API key comes from LOTCACHE_API_KEY, then SUPABASE_ANON_KEY.
  /// LOTCACHE_ACCESS_TOKEN, when set, authenticates as a user.
  pub fn credentials() -> Result<Credentials> {
    let api_key = std::env::var("LOTCACHE_API_KEY")
      .or_else(|_| std::env::var("SUPABASE_ANON_KEY"))
      .map_err(|_| {
        eyre!("API key not found. Set LOTCACHE_API_KEY or SUPABASE_ANON_KEY environment variable.")
      })?;
    let access_token = std::env::var("LOTCACHE_ACCESS_TOKEN").ok();

    Ok(Credentials {
      api_key,
      access_token,
    })
  }
}
