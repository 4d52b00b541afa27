use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Base URL of this client's own origin; anything else goes through the proxy
  #[serde(default = "default_origin")]
  pub origin: String,
  /// Proxy base URL; remote requests are rewritten to `<proxy_url>?url=<iri>`
  pub proxy_url: Option<String>,
  /// Accept header sent with document requests
  #[serde(default = "default_accept")]
  pub accept: String,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub eager: EagerConfig,
  /// Session cookie attached to credentialed requests (from PUBFETCH_SESSION)
  #[serde(skip)]
  pub session: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_document_ttl")]
  pub document_ttl_secs: u64,
  #[serde(default = "default_blob_ttl")]
  pub blob_ttl_secs: u64,
  #[serde(default = "default_max_documents")]
  pub max_documents: u64,
  #[serde(default = "default_max_blobs")]
  pub max_blobs: u64,
  /// Keep documents in SQLite so they survive a restart
  #[serde(default)]
  pub persist: bool,
  /// IRIs that are never stored, compared exactly
  #[serde(default)]
  pub never_cache: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EagerConfig {
  /// Upper bound on pages followed by a full traversal
  pub max_pages: Option<usize>,
}

fn default_origin() -> String {
  "http://localhost".to_string()
}

fn default_accept() -> String {
  "application/activity+json".to_string()
}

fn default_document_ttl() -> u64 {
  2 * 60
}

fn default_blob_ttl() -> u64 {
  20 * 60
}

fn default_max_documents() -> u64 {
  10_000
}

fn default_max_blobs() -> u64 {
  512
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      document_ttl_secs: default_document_ttl(),
      blob_ttl_secs: default_blob_ttl(),
      max_documents: default_max_documents(),
      max_blobs: default_max_blobs(),
      persist: false,
      never_cache: Vec::new(),
    }
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: default_origin(),
      proxy_url: None,
      accept: default_accept(),
      cache: CacheConfig::default(),
      eager: EagerConfig::default(),
      session: None,
    }
  }
}

impl CacheConfig {
  pub fn document_ttl(&self) -> Duration {
    Duration::from_secs(self.document_ttl_secs)
  }

  pub fn blob_ttl(&self) -> Duration {
    Duration::from_secs(self.blob_ttl_secs)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./pubfetch.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/pubfetch/config.yaml
  ///
  /// Falls back to defaults when no file is found.
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

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };
    config.session = Self::get_session();

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("pubfetch.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("pubfetch").join("config.yaml");
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

  /// Parse configuration from a YAML string.
  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    url::Url::parse(&config.origin)
      .map_err(|e| eyre!("Invalid origin '{}': {}", config.origin, e))?;
    if let Some(proxy) = &config.proxy_url {
      url::Url::parse(proxy).map_err(|e| eyre!("Invalid proxy_url '{}': {}", proxy, e))?;
    }
    Ok(config)
  }

  /// Session cookie for credentialed requests, from PUBFETCH_SESSION.
  pub fn get_session() -> Option<String> {
    std::env::var("PUBFETCH_SESSION")
      .ok()
      .filter(|s| !s.is_empty())
  }

  /// Where the persistent document cache lives.
  pub fn cache_db_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("pubfetch").join("cache.db"))
  }
}
