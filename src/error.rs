//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for caches and the reaper pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Key is absent and no default factory applies
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Cache was never acquired from (or already released by) the pool
    #[error("Cache {0} is not registered with this pool")]
    NotRegistered(u64),

    /// The reaper could not be launched
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl CacheError {
    /// Builds a `KeyNotFound` from any debuggable key.
    pub fn key_not_found<K: std::fmt::Debug>(key: &K) -> Self {
        CacheError::KeyNotFound(format!("{:?}", key))
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
