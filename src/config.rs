use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

/// Fallback origin when no config file is present.
const DEFAULT_ORIGIN: &str = "http://localhost:8080";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin the app is served from. Root-relative asset paths resolve
  /// against it, and responses from the same origin classify as basic.
  #[serde(default = "default_origin")]
  pub origin: String,

  /// Override for the cache database location (defaults to the XDG data dir)
  pub cache_db: Option<PathBuf>,
}

fn default_origin() -> String {
  DEFAULT_ORIGIN.to_string()
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: default_origin(),
      cache_db: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./breath-worker.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/breath-worker/config.yaml
  ///
  /// Falls back to defaults when no file exists anywhere.
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
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("breath-worker.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("breath-worker").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Parse the configured origin into a URL.
  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  /// Resolve a root-relative path (e.g. "/icons/icon-192x192.png") against
  /// the configured origin.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    let base = self.origin_url()?;
    base
      .join(path)
      .map_err(|e| eyre!("Cannot resolve '{}' against {}: {}", path, self.origin, e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_when_no_file() {
    let config = Config::default();
    assert_eq!(config.origin, DEFAULT_ORIGIN);
    assert!(config.cache_db.is_none());
  }

  #[test]
  fn test_parse_yaml() {
    let config: Config =
      serde_yaml::from_str("origin: https://breath.example.com\ncache_db: /tmp/cache.db\n")
        .unwrap();
    assert_eq!(config.origin, "https://breath.example.com");
    assert_eq!(config.cache_db, Some(PathBuf::from("/tmp/cache.db")));
  }

  #[test]
  fn test_resolve_root_relative() {
    let config = Config {
      origin: "https://breath.example.com".to_string(),
      cache_db: None,
    };
    let url = config.resolve("/icons/icon-192x192.png").unwrap();
    assert_eq!(
      url.as_str(),
      "https://breath.example.com/icons/icon-192x192.png"
    );
  }

  #[test]
  fn test_explicit_missing_path_is_error() {
    let result = Config::load(Some(Path::new("/nonexistent/breath-worker.yaml")));
    assert!(result.is_err());
  }
}
