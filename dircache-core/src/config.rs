//! Configuration types

use crate::{ConfigError, DirCacheError, DirCacheResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default location of the storage environment.
pub const DEFAULT_STORE_PATH: &str = "/var/lib/dircache";

/// Default LMDB map size in megabytes.
pub const DEFAULT_MAP_SIZE_MB: usize = 1024;

/// Default maximum number of named sub-databases.
pub const DEFAULT_MAX_DBS: u32 = 16;

/// Storage environment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory housing the data file and the lock file.
    pub path: PathBuf,
    /// Maximum size of the memory map in megabytes.
    pub map_size_mb: usize,
    /// Maximum number of named sub-databases (one per cache).
    pub max_dbs: u32,
    /// Open without write access, for consumers that only read the indices.
    pub read_only: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_PATH)
    }
}

impl StoreConfig {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            map_size_mb: DEFAULT_MAP_SIZE_MB,
            max_dbs: DEFAULT_MAX_DBS,
            read_only: false,
        }
    }

    /// Set the map size.
    pub fn with_map_size_mb(mut self, map_size_mb: usize) -> Self {
        self.map_size_mb = map_size_mb;
        self
    }

    /// Set the maximum number of sub-databases.
    pub fn with_max_dbs(mut self, max_dbs: u32) -> Self {
        self.max_dbs = max_dbs;
        self
    }

    /// Open the environment read-only.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Map size in bytes, as handed to the storage engine.
    pub fn map_size_bytes(&self) -> usize {
        self.map_size_mb.saturating_mul(1024 * 1024)
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `DIRCACHE_PATH`: storage directory (default: `/var/lib/dircache`)
    /// - `DIRCACHE_MAP_SIZE_MB`: map size in megabytes (default: 1024)
    /// - `DIRCACHE_MAX_DBS`: maximum number of sub-databases (default: 16)
    /// - `DIRCACHE_READ_ONLY`: `1` or `true` to open read-only (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            path: std::env::var("DIRCACHE_PATH")
                .ok()
                .map(PathBuf::from)
                .unwrap_or(defaults.path),
            map_size_mb: std::env::var("DIRCACHE_MAP_SIZE_MB")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.map_size_mb),
            max_dbs: std::env::var("DIRCACHE_MAX_DBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_dbs),
            read_only: std::env::var("DIRCACHE_READ_ONLY")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(defaults.read_only),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> DirCacheResult<()> {
        if self.path.as_os_str().is_empty() {
            return Err(DirCacheError::Config(ConfigError::MissingRequired {
                field: "path".to_string(),
            }));
        }

        if self.map_size_mb == 0 {
            return Err(DirCacheError::Config(ConfigError::InvalidValue {
                field: "map_size_mb".to_string(),
                value: self.map_size_mb.to_string(),
                reason: "map_size_mb must be greater than 0".to_string(),
            }));
        }

        if self.max_dbs == 0 {
            return Err(DirCacheError::Config(ConfigError::InvalidValue {
                field: "max_dbs".to_string(),
                value: self.max_dbs.to_string(),
                reason: "max_dbs must be greater than 0".to_string(),
            }));
        }

        Ok(())
    }
}
