//! In-process backend on top of a moka cache

use super::{CacheBackend, RawEntry, ScanPage};
use crate::error::BackendResult;
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
enum Record {
    Hash(Arc<HashMap<String, String>>),
    Bytes(Arc<[u8]>),
}

#[derive(Debug, Clone)]
struct StoredRecord {
    record: Record,
    /// Shared by the metadata and data records of one entry
    expires_at: Instant,
    /// Write that produced the record; both records of an entry carry the same one
    generation: u64,
}

impl StoredRecord {
    fn weight(&self, key: &str) -> u32 {
        let body = match &self.record {
            Record::Hash(fields) => fields.iter().map(|(k, v)| k.len() + v.len()).sum(),
            Record::Bytes(data) => data.len(),
        };
        u32::try_from(key.len() + body).unwrap_or(u32::MAX)
    }
}

struct RecordExpiry;

impl Expiry<String, StoredRecord> for RecordExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredRecord,
        created_at: Instant,
    ) -> Option<Duration> {
        Some(value.expires_at.saturating_duration_since(created_at))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredRecord,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.expires_at.saturating_duration_since(updated_at))
    }
}

#[derive(Debug, Clone)]
pub struct MemoryBackendConfig {
    /// Upper bound on stored key and payload bytes
    pub max_capacity_bytes: u64,
}

impl Default for MemoryBackendConfig {
    fn default() -> Self {
        Self {
            max_capacity_bytes: 512 * 1024 * 1024, // 512MB
        }
    }
}

/// Single-process backend; evicts by size once the capacity is reached
///
/// The two records of an entry are inserted one after the other. A read that
/// races an overwrite and sees records from different writes reports the
/// entry as absent.
pub struct MemoryBackend {
    cache: Cache<String, StoredRecord>,
    next_generation: AtomicU64,
}

impl MemoryBackend {
    pub fn new(config: MemoryBackendConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity_bytes)
            .weigher(|key: &String, value: &StoredRecord| value.weight(key))
            .expire_after(RecordExpiry)
            .build();

        Self {
            cache,
            next_generation: AtomicU64::new(0),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(MemoryBackendConfig::default())
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn read_entry(&self, meta_key: &str, data_key: &str) -> BackendResult<RawEntry> {
        let meta = self.cache.get(meta_key).await;
        let data = self.cache.get(data_key).await;

        if let (Some(meta), Some(data)) = (&meta, &data) {
            if meta.generation != data.generation {
                return Ok(RawEntry::default());
            }
        }

        let fields = match meta.map(|v| v.record) {
            Some(Record::Hash(fields)) => Some(fields.as_ref().clone()),
            _ => None,
        };
        let data = match data.map(|v| v.record) {
            Some(Record::Bytes(data)) => Some(data.to_vec()),
            _ => None,
        };

        Ok(RawEntry { fields, data })
    }

    async fn write_entry(
        &self,
        meta_key: &str,
        fields: &[(&'static str, String)],
        data_key: &str,
        data: &[u8],
        ttl: Duration,
    ) -> BackendResult<()> {
        let expires_at = Instant::now() + ttl;
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let fields = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<HashMap<_, _>>();

        self.cache
            .insert(
                meta_key.to_string(),
                StoredRecord {
                    record: Record::Hash(Arc::new(fields)),
                    expires_at,
                    generation,
                },
            )
            .await;
        self.cache
            .insert(
                data_key.to_string(),
                StoredRecord {
                    record: Record::Bytes(Arc::from(data)),
                    expires_at,
                    generation,
                },
            )
            .await;

        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> BackendResult<u64> {
        let mut removed = 0;
        for key in keys {
            if self.cache.remove(key.as_str()).await.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> BackendResult<bool> {
        Ok(self.cache.contains_key(key))
    }

    async fn scan(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        count: usize,
    ) -> BackendResult<ScanPage> {
        // Resuming after the last returned key keeps deletions between pages from
        // shifting live keys past the cursor.
        let mut keys: Vec<String> = self
            .cache
            .iter()
            .map(|(key, _)| key.as_ref().clone())
            .filter(|key| key.starts_with(prefix))
            .filter(|key| cursor.map_or(true, |after| key.as_str() > after))
            .collect();
        keys.sort_unstable();

        let count = count.max(1);
        let next = if keys.len() > count {
            keys.truncate(count);
            keys.last().cloned()
        } else {
            None
        };

        Ok(ScanPage { next, keys })
    }

    async fn memory_usage(&self) -> BackendResult<u64> {
        self.cache.run_pending_tasks().await;
        Ok(self.cache.weighted_size())
    }
}
