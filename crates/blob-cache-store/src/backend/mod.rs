//! Key/value backends the cache store persists into
//!
//! Each cached blob occupies two records: a string hash holding the metadata
//! and a raw byte record holding the payload. Backends must write both in one
//! batch with the same expiry instant.

mod memory;
mod redis_backend;

pub use memory::{MemoryBackend, MemoryBackendConfig};
pub use redis_backend::RedisBackend;

use crate::error::BackendResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Both records of an entry as read in a single round trip
#[derive(Debug, Clone, Default)]
pub struct RawEntry {
    pub fields: Option<HashMap<String, String>>,
    pub data: Option<Vec<u8>>,
}

/// One page of a cursor-based key scan
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    /// Cursor for the next call, `None` once the scan is complete
    pub next: Option<String>,
    pub keys: Vec<String>,
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Read the metadata hash and the data record together
    async fn read_entry(&self, meta_key: &str, data_key: &str) -> BackendResult<RawEntry>;

    /// Replace both records, expiring them after `ttl`
    ///
    /// `read_entry` must never pair the metadata of one write with the data of
    /// another.
    async fn write_entry(
        &self,
        meta_key: &str,
        fields: &[(&'static str, String)],
        data_key: &str,
        data: &[u8],
        ttl: Duration,
    ) -> BackendResult<()>;

    /// Delete keys, returning how many existed
    async fn delete(&self, keys: &[String]) -> BackendResult<u64>;

    async fn exists(&self, key: &str) -> BackendResult<bool>;

    /// Scan keys starting with `prefix`, passing `None` to start
    ///
    /// Keys deleted between pages must not cause live keys to be skipped.
    async fn scan(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        count: usize,
    ) -> BackendResult<ScanPage>;

    /// Bytes used by the backend
    async fn memory_usage(&self) -> BackendResult<u64>;
}
