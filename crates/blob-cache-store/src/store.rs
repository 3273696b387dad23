//! Blob cache store with probabilistic early expiration
//!
//! Every public operation absorbs backend failures: a broken backend reads as
//! an empty cache and writes become no-ops. Callers always keep their own path
//! to the origin.

use crate::backend::CacheBackend;
use crate::error::{CacheStoreError, Result};
use crate::expiration::{should_fetch_early, RandomSource, ThreadRandom};
use crate::types::{CacheEntry, CacheEntryMetadata, CacheStats, CacheStoreConfig};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const META_SUFFIX: &str = ":meta";

/// TTL-bounded blob cache in front of a slow origin
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    config: CacheStoreConfig,
    random: Arc<dyn RandomSource>,
    hits: AtomicU64,
    misses: AtomicU64,
    early_fetches: AtomicU64,
}

impl CacheStore {
    /// Create a store drawing early-expiration coin flips from the thread RNG
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheStoreConfig) -> Self {
        Self::with_random(backend, config, Arc::new(ThreadRandom))
    }

    /// Create a store with an explicit randomness source
    pub fn with_random(
        backend: Arc<dyn CacheBackend>,
        mut config: CacheStoreConfig,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        if !config.beta.is_finite() || config.beta <= 0.0 {
            warn!(beta = config.beta, "Invalid early-expiration beta, using 1.0");
            config.beta = 1.0;
        }

        Self {
            backend,
            config,
            random,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            early_fetches: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheStoreConfig {
        &self.config
    }

    fn data_key(&self, key: &str) -> String {
        format!("{}{}", self.config.prefix, key)
    }

    fn meta_key(&self, key: &str) -> String {
        format!("{}{}{}", self.config.prefix, key, META_SUFFIX)
    }

    /// Look up a blob; any failure reads as a miss
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        match self.try_get(key).await {
            Ok(Some(entry)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                if entry.is_early_fetch {
                    self.early_fetches.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, "Cache hit flagged for early refresh");
                } else {
                    debug!(key = %key, "Cache hit");
                }
                Some(entry)
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                if matches!(e, CacheStoreError::Backend(_)) {
                    warn!(key = %key, error = %e, "Cache read failed");
                } else {
                    debug!(key = %key, error = %e, "Discarding unreadable cache entry");
                }
                None
            }
        }
    }

    async fn try_get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let raw = self
            .backend
            .read_entry(&self.meta_key(key), &self.data_key(key))
            .await?;

        let (Some(fields), Some(data)) = (raw.fields, raw.data) else {
            return Ok(None);
        };

        let metadata = CacheEntryMetadata::from_fields(&fields)?;
        if metadata.size != data.len() {
            return Err(CacheStoreError::CorruptMetadata(format!(
                "size {} does not match payload length {}",
                metadata.size,
                data.len()
            )));
        }

        let age_ms = Utc::now()
            .timestamp_millis()
            .checked_sub(metadata.cached_at)
            .ok_or_else(|| {
                CacheStoreError::CorruptMetadata(format!(
                    "cachedAt {} is out of range",
                    metadata.cached_at
                ))
            })?
            .max(0) as u64;
        let is_early_fetch = should_fetch_early(
            Duration::from_millis(age_ms),
            Duration::from_secs(metadata.ttl),
            self.config.beta,
            self.random.as_ref(),
        );

        Ok(Some(CacheEntry {
            data,
            content_type: metadata.content_type,
            size: metadata.size,
            is_early_fetch,
        }))
    }

    /// Store a blob; returns false when it was not written
    pub async fn set(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
        ttl: Option<Duration>,
    ) -> bool {
        match self.try_set(key, data, content_type, ttl).await {
            Ok(()) => {
                debug!(key = %key, size = data.len(), "Cached blob");
                true
            }
            Err(e @ CacheStoreError::Backend(_)) => {
                warn!(key = %key, error = %e, "Cache write failed");
                false
            }
            Err(e) => {
                debug!(key = %key, error = %e, "Blob not cached");
                false
            }
        }
    }

    async fn try_set(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
        ttl: Option<Duration>,
    ) -> Result<()> {
        if data.len() > self.config.max_blob_size {
            return Err(CacheStoreError::OversizedPayload {
                size: data.len(),
                max: self.config.max_blob_size,
            });
        }

        let ttl = ttl.unwrap_or(self.config.default_ttl);
        // Metadata counts whole seconds, so sub-second TTLs cannot be represented
        if ttl.as_secs() == 0 {
            return Err(CacheStoreError::InvalidTtl);
        }
        let ttl = Duration::from_secs(ttl.as_secs());

        let metadata = CacheEntryMetadata {
            cached_at: Utc::now().timestamp_millis(),
            ttl: ttl.as_secs(),
            size: data.len(),
            content_type: content_type.to_string(),
        };

        self.backend
            .write_entry(
                &self.meta_key(key),
                &metadata.to_fields(),
                &self.data_key(key),
                data,
                ttl,
            )
            .await?;
        Ok(())
    }

    /// Remove a blob and its metadata; true if anything was removed
    pub async fn delete(&self, key: &str) -> bool {
        let keys = [self.data_key(key), self.meta_key(key)];
        match self.backend.delete(&keys).await {
            Ok(removed) => removed > 0,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache delete failed");
                false
            }
        }
    }

    /// Whether a blob is cached, without reading it
    pub async fn has(&self, key: &str) -> bool {
        match self.backend.exists(&self.data_key(key)).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache existence check failed");
                false
            }
        }
    }

    /// Remove every entry in the namespace, returning the number of entries removed
    ///
    /// Entries are counted by their metadata records. On a backend failure the
    /// count accumulated so far is returned.
    pub async fn clear(&self) -> u64 {
        let mut removed_entries = 0;
        let mut cursor: Option<String> = None;

        loop {
            let page = match self
                .backend
                .scan(
                    &self.config.prefix,
                    cursor.as_deref(),
                    self.config.scan_batch_size,
                )
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!(error = %e, removed = removed_entries, "Cache clear aborted during scan");
                    return removed_entries;
                }
            };

            // Metadata records are deleted on their own so that only keys that
            // actually existed are counted; scans may repeat keys.
            let (meta_keys, data_keys): (Vec<String>, Vec<String>) = page
                .keys
                .into_iter()
                .partition(|key| key.ends_with(META_SUFFIX));

            for (keys, counted) in [(meta_keys, true), (data_keys, false)] {
                if keys.is_empty() {
                    continue;
                }
                match self.backend.delete(&keys).await {
                    Ok(removed) if counted => removed_entries += removed,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, removed = removed_entries, "Cache clear aborted during delete");
                        return removed_entries;
                    }
                }
            }

            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!(removed = removed_entries, prefix = %self.config.prefix, "Cleared cache");
        removed_entries
    }

    /// Best-effort statistics; backend figures fall back to zero on failure
    pub async fn get_stats(&self) -> CacheStats {
        CacheStats {
            key_count: self.count_keys().await.unwrap_or_else(|e| {
                warn!(error = %e, "Failed to count cache keys");
                0
            }),
            memory_usage: self.backend.memory_usage().await.unwrap_or_else(|e| {
                warn!(error = %e, "Failed to read cache memory usage");
                0
            }),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            early_fetches: self.early_fetches.load(Ordering::Relaxed),
        }
    }

    async fn count_keys(&self) -> Result<u64> {
        let mut count = 0;
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .backend
                .scan(
                    &self.config.prefix,
                    cursor.as_deref(),
                    self.config.scan_batch_size,
                )
                .await?;
            count += page.keys.len() as u64;
            match page.next {
                Some(next) => cursor = Some(next),
                None => return Ok(count),
            }
        }
    }
}
