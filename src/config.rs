//! Store configuration.
//!
//! [`StoreConfig`] carries the construction-time settings of an
//! [`EmbeddingStore`](crate::EmbeddingStore). It can be built in code or
//! read from a TOML file through [`FileConfig`], which is resolved in the
//! following order:
//! 1. explicit path (e.g. `--config <path>`)
//! 2. `~/.embestore/config.toml` (user)
//! 3. `/etc/embestore/config.toml` (system)
//!
//! ```toml
//! [store]
//! capacity = 10000
//! eviction_policy = "lru"
//! persistence_path = "/var/cache/embestore/sentences.parquet"
//! backend = "parquet"
//! ```

use std::fmt;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::cache::eviction::{Eviction, EvictionPolicy};
use crate::{EmbestoreError, Result};

/// Which [`TableBackend`](crate::cache::TableBackend) persists the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Columnar Parquet file (requires the `parquet` feature).
    Parquet,
    /// Columnar JSON document.
    Json,
}

impl Default for BackendKind {
    fn default() -> Self {
        if cfg!(feature = "parquet") {
            Self::Parquet
        } else {
            Self::Json
        }
    }
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parquet => "parquet",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = EmbestoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "parquet" => Ok(Self::Parquet),
            "json" => Ok(Self::Json),
            other => Err(EmbestoreError::Configuration(format!(
                "unknown backend '{other}', expected parquet or json"
            ))),
        }
    }
}

/// Construction-time settings for an embedding store.
///
/// `capacity` and `eviction_policy` must be set together; see
/// [`StoreConfig::eviction()`].
///
/// ```rust
/// # use embestore::{EvictionPolicy, StoreConfig};
/// let config = StoreConfig::new()
///     .capacity(1_000)
///     .eviction_policy(EvictionPolicy::Lfu)
///     .persistence_path("cache.parquet");
/// assert!(config.eviction().unwrap().is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Maximum number of entries kept after an eviction pass.
    #[serde(default)]
    pub capacity: Option<usize>,
    /// Policy applied once the store grows past `capacity`.
    #[serde(default)]
    pub eviction_policy: Option<EvictionPolicy>,
    /// Default location for load on construction and for `save(None)`.
    #[serde(default)]
    pub persistence_path: Option<PathBuf>,
    /// Storage format of the persisted table.
    #[serde(default)]
    pub backend: BackendKind,
}

impl StoreConfig {
    /// Create an unbounded, in-memory configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of entries.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Set the eviction policy.
    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = Some(policy);
        self
    }

    /// Set the default persistence path.
    pub fn persistence_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.persistence_path = Some(path.into());
        self
    }

    /// Set the storage backend.
    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Validate the capacity/policy pair and resolve it to an [`Eviction`].
    ///
    /// Returns `Ok(None)` when neither is set (unbounded store).
    pub fn eviction(&self) -> Result<Option<Eviction>> {
        let capacity = match self.capacity {
            Some(0) => {
                return Err(EmbestoreError::Configuration(
                    "capacity must be larger than 0".to_string(),
                ));
            }
            Some(n) => NonZeroUsize::new(n),
            None => None,
        };

        match (capacity, self.eviction_policy) {
            (None, None) => Ok(None),
            (Some(capacity), Some(policy)) => Ok(Some(Eviction::new(policy, capacity))),
            (Some(_), None) => Err(EmbestoreError::Configuration(
                "eviction_policy is required when capacity is set".to_string(),
            )),
            (None, Some(policy)) => Err(EmbestoreError::Configuration(format!(
                "capacity is required when eviction_policy is '{policy}'"
            ))),
        }
    }

    /// Check the configuration without building anything.
    pub fn validate(&self) -> Result<()> {
        self.eviction().map(|_| ())
    }
}

/// On-disk configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub store: StoreConfig,
}

impl FileConfig {
    /// Parse a TOML document and validate the store section.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| EmbestoreError::Configuration(format!("failed to parse config: {e}")))?;
        config.store.validate()?;
        Ok(config)
    }

    /// Load configuration from the standard locations.
    ///
    /// Fails if no file can be found.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Err(EmbestoreError::Configuration(
                "No config file found. Create ~/.embestore/config.toml or /etc/embestore/config.toml"
                    .to_string(),
            )),
        }
    }

    /// Like [`load()`](Self::load), but falls back to defaults when no file
    /// exists at the implicit locations. An explicit path must still exist.
    pub fn load_or_default(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EmbestoreError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml(&content)
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(EmbestoreError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".embestore").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        let system_config = PathBuf::from("/etc/embestore/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_unbounded() {
        let config = StoreConfig::default();
        assert!(config.eviction().unwrap().is_none());
        assert!(config.persistence_path.is_none());
    }

    #[test]
    fn capacity_without_policy_rejected() {
        let err = StoreConfig::new().capacity(10).validate().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("eviction_policy"));
    }

    #[test]
    fn policy_without_capacity_rejected() {
        let err = StoreConfig::new()
            .eviction_policy(EvictionPolicy::Lru)
            .validate()
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("capacity"));
    }

    #[test]
    fn zero_capacity_rejected() {
        let err = StoreConfig::new()
            .capacity(0)
            .eviction_policy(EvictionPolicy::Lfu)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("larger than 0"));
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            [store]
            capacity = 500
            eviction_policy = "LFU"
            persistence_path = "/tmp/cache.json"
            backend = "json"
        "#;
        let config = FileConfig::from_toml(toml).unwrap();
        assert_eq!(config.store.capacity, Some(500));
        assert_eq!(config.store.eviction_policy, Some(EvictionPolicy::Lfu));
        assert_eq!(
            config.store.persistence_path,
            Some(PathBuf::from("/tmp/cache.json"))
        );
        assert_eq!(config.store.backend, BackendKind::Json);
    }

    #[test]
    fn parse_unknown_policy_rejected() {
        let toml = r#"
            [store]
            capacity = 5
            eviction_policy = "mru"
        "#;
        let err = FileConfig::from_toml(toml).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("mru"));
    }

    #[test]
    fn parse_mismatched_pair_rejected() {
        let toml = r#"
            [store]
            capacity = 5
        "#;
        assert!(FileConfig::from_toml(toml).is_err());
    }

    #[test]
    fn parse_empty_config_uses_defaults() {
        let config = FileConfig::from_toml("").unwrap();
        assert_eq!(config.store, StoreConfig::default());
    }

    #[test]
    fn config_not_found_returns_error() {
        let result = FileConfig::load(Some(Path::new("/nonexistent/config.toml")));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Config file not found"));
    }

    #[test]
    fn backend_from_str() {
        assert_eq!("Parquet".parse::<BackendKind>().unwrap(), BackendKind::Parquet);
        assert_eq!("json".parse::<BackendKind>().unwrap(), BackendKind::Json);
        assert!("csv".parse::<BackendKind>().is_err());
    }
}
