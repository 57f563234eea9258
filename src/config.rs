//! # Configuration Module
//!
//! ## Purpose
//! Centralized configuration management for the sync service, supporting
//! TOML files, environment variable overrides, and validation.
//!
//! ## Input/Output Specification
//! - **Input**: TOML configuration file path, `LEGAL_SYNC_*` environment
//!   variables
//! - **Output**: Validated `Config` struct consumed by all components
//!
//! ## Key Features
//! - Layered configuration: defaults -> file -> environment
//! - Per-kind bucket names for the object store
//! - Fail-fast validation with descriptive error messages
//!
//! ## Usage
//! ```rust,no_run
//! use legal_index_sync::config::Config;
//!
//! let config = Config::from_file("config.toml").unwrap();
//! assert!(config.sync.batch_size > 0);
//! ```

use crate::errors::{Result, SyncError};
use crate::DocumentKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for the sync service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Object-store connection settings
    pub store: StoreConfig,
    /// Search-index settings
    pub index: IndexConfig,
    /// Synchronization job settings
    pub sync: SyncConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Which object-store backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Local filesystem layout, one directory per bucket
    Fs,
    /// Remote HTTP object store, one URL path segment per bucket
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend selection
    pub backend: StoreBackend,
    /// Root directory for the `fs` backend
    pub root_dir: PathBuf,
    /// Base URL for the `http` backend, e.g. `https://store.example.org`
    pub base_url: String,
    /// Request timeout for the `http` backend
    pub timeout_secs: u64,
    /// Bucket names, one per document kind
    pub buckets: BucketsConfig,
}

/// Object-store bucket names keyed by document kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketsConfig {
    pub norm: String,
    pub case_law: String,
    pub literature: String,
    pub administrative_directive: String,
}

impl BucketsConfig {
    /// Resolves the configured bucket name for a document kind.
    pub fn for_kind(&self, kind: DocumentKind) -> &str {
        match kind {
            DocumentKind::Norm => &self.norm,
            DocumentKind::CaseLaw => &self.case_law,
            DocumentKind::Literature => &self.literature,
            DocumentKind::AdministrativeDirective => &self.administrative_directive,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory holding the embedded index database
    pub path: PathBuf,
    /// Whether stored documents are compressed on disk
    pub compression_enabled: bool,
    /// Page cache size for the embedded database in megabytes
    pub cache_capacity_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Document kinds processed by scheduled runs
    pub kinds: Vec<DocumentKind>,
    /// Seconds between scheduled sync runs
    pub interval_secs: u64,
    /// Whether a sync run is triggered immediately at startup
    pub run_on_startup: bool,
    /// Number of documents per bulk index write
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Emit JSON-formatted log lines instead of human-readable ones
    pub json: bool,
}

impl Config {
    /// Loads configuration from a TOML file, applies environment overrides,
    /// and validates the result.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| SyncError::Config {
            message: format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ),
        })?;

        let mut config: Config = toml::from_str(&content).map_err(|e| SyncError::Config {
            message: format!("failed to parse config file: {}", e),
        })?;

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from defaults plus environment overrides,
    /// used when no config file is given.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Applies `LEGAL_SYNC_*` environment variables on top of the current
    /// values. Unparsable values are ignored rather than fatal.
    fn apply_env_overrides(&mut self) {
        if let Ok(backend) = std::env::var("LEGAL_SYNC_STORE_BACKEND") {
            match backend.to_lowercase().as_str() {
                "fs" => self.store.backend = StoreBackend::Fs,
                "http" => self.store.backend = StoreBackend::Http,
                _ => {}
            }
        }
        if let Ok(root) = std::env::var("LEGAL_SYNC_STORE_ROOT") {
            self.store.root_dir = PathBuf::from(root);
        }
        if let Ok(url) = std::env::var("LEGAL_SYNC_STORE_BASE_URL") {
            self.store.base_url = url;
        }
        if let Ok(path) = std::env::var("LEGAL_SYNC_INDEX_PATH") {
            self.index.path = PathBuf::from(path);
        }
        if let Ok(secs) = std::env::var("LEGAL_SYNC_INTERVAL_SECS") {
            if let Ok(secs) = secs.parse() {
                self.sync.interval_secs = secs;
            }
        }
        if let Ok(level) = std::env::var("LEGAL_SYNC_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Validates the configuration, returning a descriptive error for the
    /// first problem found.
    pub fn validate(&self) -> Result<()> {
        match self.store.backend {
            StoreBackend::Fs => {
                if self.store.root_dir.as_os_str().is_empty() {
                    return Err(SyncError::Config {
                        message: "store.root_dir must be set for the fs backend".to_string(),
                    });
                }
            }
            StoreBackend::Http => {
                if !self.store.base_url.starts_with("http://")
                    && !self.store.base_url.starts_with("https://")
                {
                    return Err(SyncError::Config {
                        message: format!(
                            "store.base_url must be an http(s) URL, got '{}'",
                            self.store.base_url
                        ),
                    });
                }
            }
        }

        if self.store.timeout_secs == 0 {
            return Err(SyncError::Config {
                message: "store.timeout_secs must be greater than zero".to_string(),
            });
        }

        if self.index.path.as_os_str().is_empty() {
            return Err(SyncError::Config {
                message: "index.path must not be empty".to_string(),
            });
        }

        if self.sync.kinds.is_empty() {
            return Err(SyncError::Config {
                message: "sync.kinds must name at least one document kind".to_string(),
            });
        }

        if self.sync.interval_secs == 0 {
            return Err(SyncError::Config {
                message: "sync.interval_secs must be greater than zero".to_string(),
            });
        }

        if self.sync.batch_size == 0 {
            return Err(SyncError::Config {
                message: "sync.batch_size must be greater than zero".to_string(),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(SyncError::Config {
                message: format!(
                    "logging.level must be one of {:?}, got '{}'",
                    valid_levels, self.logging.level
                ),
            });
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            store: StoreConfig::default(),
            index: IndexConfig::default(),
            sync: SyncConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            backend: StoreBackend::Fs,
            root_dir: PathBuf::from("./data/store"),
            base_url: String::new(),
            timeout_secs: 30,
            buckets: BucketsConfig::default(),
        }
    }
}

impl Default for BucketsConfig {
    fn default() -> Self {
        BucketsConfig {
            norm: "norm".to_string(),
            case_law: "case-law".to_string(),
            literature: "literature".to_string(),
            administrative_directive: "administrative-directive".to_string(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            path: PathBuf::from("./data/index"),
            compression_enabled: true,
            cache_capacity_mb: 64,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            kinds: DocumentKind::ALL.to_vec(),
            interval_secs: 300,
            run_on_startup: true,
            batch_size: 100,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_http_backend_requires_url() {
        let mut config = Config::default();
        config.store.backend = StoreBackend::Http;
        assert!(config.validate().is_err());
        config.store.base_url = "https://store.example.org".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml = r#"
            [sync]
            interval_secs = 60

            [store.buckets]
            norm = "norm-prod"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.sync.interval_secs, 60);
        assert_eq!(config.sync.batch_size, 100);
        assert_eq!(config.store.buckets.for_kind(DocumentKind::Norm), "norm-prod");
        assert_eq!(
            config.store.buckets.for_kind(DocumentKind::CaseLaw),
            "case-law"
        );
    }

    #[test]
    fn test_invalid_batch_size_rejected() {
        let mut config = Config::default();
        config.sync.batch_size = 0;
        assert!(config.validate().is_err());
    }
}
