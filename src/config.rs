use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use url::Url;

use crate::cache::TierNames;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Name shown in notifications and on the offline page
  pub app_name: String,
  /// Origin that relative URLs (assets, queue endpoints) resolve against
  pub origin: String,
  pub cache_prefix: String,
  /// Bumping this invalidates every tier on the next activation
  pub cache_version: String,
  /// Assets fetched into the static tier at install time
  pub static_assets: Vec<String>,
  /// Path fragments routed to stale-while-revalidate
  pub api_patterns: Vec<String>,
  #[serde(deserialize_with = "deserialize_lowercase_set")]
  pub static_extensions: BTreeSet<String>,
  /// Logical queue name -> replay binding
  pub queues: BTreeMap<String, QueueConfig>,
  /// Sync tag that replays every queue
  pub sync_all_tag: String,
  /// SQLite file (defaults to $XDG_DATA_HOME/fueltracker-sw/store.db)
  pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
  /// Endpoint records are POSTed to on replay
  pub endpoint: String,
  /// Reconnect signal name for this queue (defaults to the queue name)
  pub sync_tag: Option<String>,
}

fn deserialize_lowercase_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let v: Vec<String> = Vec::deserialize(deserializer)?;
  Ok(v.into_iter().map(|s| s.to_lowercase()).collect())
}

impl Default for Config {
  fn default() -> Self {
    let queues = [
      ("pending-fuel-records", "/add_fuel_record", "sync-fuel-records"),
      ("pending-oil-changes", "/oil_change_global", "sync-oil-changes"),
    ]
    .into_iter()
    .map(|(name, endpoint, tag)| {
      (
        name.to_string(),
        QueueConfig {
          endpoint: endpoint.to_string(),
          sync_tag: Some(tag.to_string()),
        },
      )
    })
    .collect();

    Self {
      app_name: "FuelTracker Pro".to_string(),
      origin: "http://localhost:5000".to_string(),
      cache_prefix: "fueltracker-pro".to_string(),
      cache_version: "v2".to_string(),
      static_assets: [
        "/",
        "/static/icons/icon-192.png",
        "/static/icons/icon-512.png",
        "https://cdn.jsdelivr.net/npm/bootstrap@5.3.0/dist/css/bootstrap.min.css",
        "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.0.0/css/all.min.css",
        "https://cdn.jsdelivr.net/npm/bootstrap@5.3.0/dist/js/bootstrap.bundle.min.js",
        "https://cdn.jsdelivr.net/npm/chart.js",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
      api_patterns: ["/api/", "/dashboard", "/vehicles"]
        .into_iter()
        .map(String::from)
        .collect(),
      static_extensions: ["png", "jpg", "jpeg", "svg", "gif", "css", "js"]
        .into_iter()
        .map(String::from)
        .collect(),
      queues,
      sync_all_tag: "background-sync".to_string(),
      database: None,
    }
  }
}

impl Config {
  /// Load configuration from file, falling back to built-in defaults.
  ///
  /// Search order:
  /// 1. Explicit path if provided (must exist)
  /// 2. ./fueltracker-sw.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/fueltracker-sw/config.yaml
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

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        tracing::info!("no configuration file found, using defaults");
        Config::default()
      }
    };

    config.with_env_overrides().validated()
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("fueltracker-sw.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("fueltracker-sw").join("config.yaml");
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

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Apply FUELTRACKER_SW_ORIGIN and FUELTRACKER_SW_CACHE_VERSION.
  fn with_env_overrides(mut self) -> Self {
    if let Ok(origin) = std::env::var("FUELTRACKER_SW_ORIGIN") {
      self.origin = origin;
    }
    if let Ok(version) = std::env::var("FUELTRACKER_SW_CACHE_VERSION") {
      self.cache_version = version;
    }
    self
  }

  fn validated(self) -> Result<Self> {
    self.origin_url()?;
    if self.cache_version.trim().is_empty() {
      return Err(eyre!("cache_version must not be empty"));
    }
    Ok(self)
  }

  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  /// Resolve a possibly-relative URL against the origin.
  pub fn resolve(&self, url: &str) -> Result<Url> {
    self
      .origin_url()?
      .join(url)
      .map_err(|e| eyre!("Invalid URL '{}': {}", url, e))
  }

  /// The tier names valid for the configured cache version.
  pub fn tier_names(&self) -> TierNames {
    TierNames::versioned(&self.cache_prefix, &self.cache_version)
  }

  /// Sync tag bound to each queue.
  pub fn sync_tag_for<'a>(&'a self, queue: &'a str) -> Option<&'a str> {
    self
      .queues
      .get(queue)
      .map(|q| q.sync_tag.as_deref().unwrap_or(queue))
  }

  /// Queue whose sync tag is `tag`.
  pub fn queue_for_tag(&self, tag: &str) -> Option<&str> {
    self
      .queues
      .keys()
      .find(|name| self.sync_tag_for(name) == Some(tag))
      .map(String::as_str)
  }

  pub fn database_path(&self) -> Result<PathBuf> {
    if let Some(path) = &self.database {
      return Ok(path.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("fueltracker-sw").join("store.db"))
  }
}
