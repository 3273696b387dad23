//! Error types for the blob cache store
//!
//! None of these reach callers of [`crate::CacheStore`]; they are logged and
//! folded into misses, `false` or zero counts at the public boundary.

use thiserror::Error;

/// Failure reported by a [`crate::CacheBackend`]
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Why a cache operation did not produce a value
#[derive(Debug, Error)]
pub enum CacheStoreError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("Payload of {size} bytes exceeds the {max} byte limit")]
    OversizedPayload { size: usize, max: usize },
    #[error("Corrupt metadata: {0}")]
    CorruptMetadata(String),
    #[error("TTL must be greater than zero")]
    InvalidTtl,
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;
pub type Result<T> = std::result::Result<T, CacheStoreError>;
