use chrono::Duration as TtlDuration;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CachePolicy;

/// Health endpoint probed when none is configured.
pub const DEFAULT_HEALTH_PATH: &str = "/health";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_PROBE_INTERVAL_SECS: u64 = 15;

/// Environment variable holding the API token.
pub const TOKEN_ENV: &str = "OFFSYNC_API_TOKEN";

/// Storage path that selects a throwaway in-memory store.
const IN_MEMORY: &str = ":memory:";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub server: ServerConfig,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  /// Base URL every target is resolved against
  pub base_url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  #[serde(default = "default_health_path")]
  pub health_path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// SQLite file (defaults to the user data directory), or ":memory:"
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_ttl_secs")]
  pub ttl_secs: u64,
  /// Per-namespace TTL overrides, e.g. `prices: 600`
  #[serde(default)]
  pub namespace_ttl_secs: BTreeMap<String, u64>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      ttl_secs: default_ttl_secs(),
      namespace_ttl_secs: BTreeMap::new(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  #[serde(default = "default_poll_interval_secs")]
  pub poll_interval_secs: u64,
  #[serde(default = "default_probe_interval_secs")]
  pub probe_interval_secs: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      poll_interval_secs: default_poll_interval_secs(),
      probe_interval_secs: default_probe_interval_secs(),
    }
  }
}

fn default_timeout_secs() -> u64 {
  DEFAULT_TIMEOUT_SECS
}

fn default_health_path() -> String {
  DEFAULT_HEALTH_PATH.to_string()
}

fn default_ttl_secs() -> u64 {
  (CachePolicy::DEFAULT_TTL_HOURS * 3600) as u64
}

fn default_poll_interval_secs() -> u64 {
  DEFAULT_POLL_INTERVAL_SECS
}

fn default_probe_interval_secs() -> u64 {
  DEFAULT_PROBE_INTERVAL_SECS
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
        "No configuration file found. Create one at ~/.config/offsync/config.yaml\n\
                 with at least:\n\n  server:\n    base_url: https://api.example.com"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("offsync.yaml");
    if local.exists() {
      return Some(local);
    }

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

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  /// Parse YAML configuration.
  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.server.base_url.trim().is_empty() {
      return Err(eyre!("server.base_url must not be empty"));
    }

    for (name, secs) in [
      ("server.timeout_secs", self.server.timeout_secs),
      ("sync.poll_interval_secs", self.sync.poll_interval_secs),
      ("sync.probe_interval_secs", self.sync.probe_interval_secs),
    ] {
      if secs == 0 {
        return Err(eyre!("{} must be at least 1", name));
      }
    }

    if ttl(self.cache.ttl_secs).is_none() {
      return Err(eyre!("cache.ttl_secs is out of range: {}", self.cache.ttl_secs));
    }
    for (namespace, secs) in &self.cache.namespace_ttl_secs {
      if ttl(*secs).is_none() {
        return Err(eyre!(
          "cache.namespace_ttl_secs.{} is out of range: {}",
          namespace,
          secs
        ));
      }
    }

    Ok(())
  }

  /// Get the API token from the environment, if set.
  pub fn api_token_from_env() -> Option<String> {
    std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty())
  }
}

impl ServerConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

impl StorageConfig {
  pub fn is_in_memory(&self) -> bool {
    self.path.as_deref() == Some(Path::new(IN_MEMORY))
  }
}

impl CacheConfig {
  /// TTLs as a policy. Values `Config::parse` would reject fall back to the
  /// default TTL.
  pub fn policy(&self) -> CachePolicy {
    let fallback = TtlDuration::hours(CachePolicy::DEFAULT_TTL_HOURS);
    self.namespace_ttl_secs.iter().fold(
      CachePolicy::new(ttl(self.ttl_secs).unwrap_or(fallback)),
      |policy, (namespace, secs)| {
        policy.with_namespace_ttl(namespace.clone(), ttl(*secs).unwrap_or(fallback))
      },
    )
  }
}

impl SyncConfig {
  pub fn poll_interval(&self) -> Duration {
    Duration::from_secs(self.poll_interval_secs)
  }

  pub fn probe_interval(&self) -> Duration {
    Duration::from_secs(self.probe_interval_secs)
  }
}

fn ttl(secs: u64) -> Option<TtlDuration> {
  i64::try_from(secs).ok().and_then(TtlDuration::try_seconds)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::parse("server:\n  base_url: https://api.example.com\n").unwrap();

    assert_eq!(config.server.base_url, "https://api.example.com");
    assert_eq!(config.server.timeout(), Duration::from_secs(10));
    assert_eq!(config.server.health_path, "/health");
    assert_eq!(config.storage.path, None);
    assert_eq!(config.cache.ttl_secs, 86_400);
    assert_eq!(config.sync.poll_interval(), Duration::from_secs(30));
    assert_eq!(config.sync.probe_interval(), Duration::from_secs(15));
    assert_eq!(config.cache.policy(), CachePolicy::default());
  }

  #[test]
  fn test_full_config() {
    let yaml = r#"
server:
  base_url: http://localhost:8080/api
  timeout_secs: 3
  health_path: /ping
storage:
  path: ":memory:"
cache:
  ttl_secs: 3600
  namespace_ttl_secs:
    prices: 60
sync:
  poll_interval_secs: 5
  probe_interval_secs: 2
"#;
    let config = Config::parse(yaml).unwrap();

    assert_eq!(config.server.timeout(), Duration::from_secs(3));
    assert_eq!(config.server.health_path, "/ping");
    assert!(config.storage.is_in_memory());
    assert_eq!(config.sync.poll_interval(), Duration::from_secs(5));

    let policy = config.cache.policy();
    assert_eq!(policy.ttl_for("prices:1"), TtlDuration::seconds(60));
    assert_eq!(policy.ttl_for("listings:1"), TtlDuration::hours(1));
  }

  #[test]
  fn test_missing_base_url_is_an_error() {
    assert!(Config::parse("storage:\n  path: /tmp/x.db\n").is_err());
    assert!(Config::parse("server:\n  base_url: \"\"\n").is_err());
  }

  #[test]
  fn test_zero_intervals_are_rejected() {
    let base = "server:\n  base_url: https://api.example.com\n";
    for extra in [
      "  timeout_secs: 0\n",
      "sync:\n  poll_interval_secs: 0\n",
      "sync:\n  probe_interval_secs: 0\n",
    ] {
      let yaml = format!("{}{}", base, extra);
      let err = Config::parse(&yaml).unwrap_err();
      assert!(err.to_string().contains("must be at least 1"), "{}", yaml);
    }
  }

  #[test]
  fn test_out_of_range_ttl_is_rejected() {
    let base = "server:\n  base_url: https://api.example.com\n";

    let err =
      Config::parse(&format!("{}cache:\n  ttl_secs: 10000000000000000\n", base)).unwrap_err();
    assert!(err.to_string().contains("cache.ttl_secs"));

    let err = Config::parse(&format!(
      "{}cache:\n  namespace_ttl_secs:\n    prices: 18446744073709551615\n",
      base
    ))
    .unwrap_err();
    assert!(err.to_string().contains("prices"));
  }

  #[test]
  fn test_policy_never_panics_on_unchecked_values() {
    let cache = CacheConfig {
      ttl_secs: u64::MAX,
      namespace_ttl_secs: BTreeMap::from([("prices".to_string(), 10_000_000_000_000_000)]),
    };

    let expected = CachePolicy::default().with_namespace_ttl("prices", TtlDuration::hours(24));
    assert_eq!(cache.policy(), expected);
  }

  #[test]
  fn test_load_explicit_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("offsync.yaml");
    std::fs::write(&path, "server:\n  base_url: https://api.example.com\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.server.base_url, "https://api.example.com");

    let missing = dir.path().join("nope.yaml");
    let err = Config::load(Some(&missing)).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }
}
