//! Cache types

use crate::error::CacheStoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

const FIELD_CACHED_AT: &str = "cachedAt";
const FIELD_TTL: &str = "ttl";
const FIELD_SIZE: &str = "size";
const FIELD_CONTENT_TYPE: &str = "contentType";

/// A cached blob as handed back to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: Vec<u8>,
    pub content_type: String,
    pub size: usize,
    /// The data is still valid, but the caller should refresh it from the origin
    pub is_early_fetch: bool,
}

/// Metadata persisted next to each blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntryMetadata {
    /// Write time in milliseconds since the Unix epoch
    pub cached_at: i64,
    /// Validity in seconds
    pub ttl: u64,
    pub size: usize,
    pub content_type: String,
}

impl CacheEntryMetadata {
    /// Encode as the string fields of the backend hash record
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            (FIELD_CACHED_AT, self.cached_at.to_string()),
            (FIELD_TTL, self.ttl.to_string()),
            (FIELD_SIZE, self.size.to_string()),
            (FIELD_CONTENT_TYPE, self.content_type.clone()),
        ]
    }

    /// Decode from a backend hash record, rejecting missing or unparsable fields
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, CacheStoreError> {
        let cached_at = parse_field(fields, FIELD_CACHED_AT)?;
        let ttl: u64 = parse_field(fields, FIELD_TTL)?;
        let size = parse_field(fields, FIELD_SIZE)?;
        let content_type = fields
            .get(FIELD_CONTENT_TYPE)
            .cloned()
            .ok_or_else(|| CacheStoreError::CorruptMetadata("missing contentType".into()))?;

        if ttl == 0 {
            return Err(CacheStoreError::CorruptMetadata("ttl is zero".into()));
        }

        Ok(Self {
            cached_at,
            ttl,
            size,
            content_type,
        })
    }
}

fn parse_field<T: std::str::FromStr>(
    fields: &HashMap<String, String>,
    name: &str,
) -> Result<T, CacheStoreError> {
    let raw = fields
        .get(name)
        .ok_or_else(|| CacheStoreError::CorruptMetadata(format!("missing {name}")))?;
    raw.parse()
        .map_err(|_| CacheStoreError::CorruptMetadata(format!("unparsable {name}: {raw:?}")))
}

/// Best-effort statistics about the cache namespace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Backend keys under the namespace prefix (two per cached blob)
    pub key_count: u64,
    /// Bytes reported by the backend
    pub memory_usage: u64,
    pub hits: u64,
    pub misses: u64,
    pub early_fetches: u64,
}

/// Tuning for [`crate::CacheStore`]
#[derive(Debug, Clone)]
pub struct CacheStoreConfig {
    /// Namespace prepended to every backend key
    pub prefix: String,
    /// TTL applied when `set` is called without one
    pub default_ttl: Duration,
    /// Payloads larger than this are never written
    pub max_blob_size: usize,
    /// Early-expiration aggressiveness; higher refreshes earlier
    pub beta: f64,
    /// Keys requested per scan round trip in `clear` and `get_stats`
    pub scan_batch_size: usize,
}

impl Default for CacheStoreConfig {
    fn default() -> Self {
        Self {
            prefix: "blob:".to_string(),
            default_ttl: Duration::from_secs(24 * 60 * 60), // 24 hours
            max_blob_size: 10 * 1024 * 1024,                 // 10MB
            beta: 1.0,
            scan_batch_size: 100,
        }
    }
}
