//! Error types for dircache operations

use std::path::PathBuf;
use thiserror::Error;

/// Storage backend errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The environment could not be opened or created. Fatal at startup.
    #[error("Failed to open store at {}: {reason}", path.display())]
    Open { path: PathBuf, reason: String },

    #[error("Transaction failed: {reason}")]
    Transaction { reason: String },

    #[error("Storage I/O failed: {reason}")]
    Io { reason: String },

    #[error("Sub-database {name} is incompatible: {reason}")]
    Incompatible { name: String, reason: String },

    #[error("Store was opened read-only")]
    ReadOnly,

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Cache registry errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown cache: {name}")]
    UnknownCache { name: String },

    #[error("Cache already registered: {name}")]
    DuplicateCache { name: String },

    #[error("Shard targets cache {shard_cache} but was added to {cache}")]
    ShardCacheMismatch { shard_cache: String, cache: String },
}

/// Errors reported by the directory collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("Search for {filter} failed: {reason}")]
    SearchFailed { filter: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all dircache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirCacheError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for dircache operations.
pub type DirCacheResult<T> = Result<T, DirCacheError>;

// =============================================================================
// TESTS
// =============================================================================
