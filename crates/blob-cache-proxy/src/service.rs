//! Blob lookup through the cache store and the request coalescer
//!
//! A hit is served from the cache. A hit flagged for early refresh is served
//! too, and a coalesced refresh runs in the background. A miss waits on a
//! coalesced origin fetch, which repopulates the cache for everyone.

use async_trait::async_trait;
use atproto_blob_resolver::{Blob, BlobResolver, BlobResolverError};
use blob_cache_store::CacheStore;
use futures::future::{BoxFuture, FutureExt};
use request_coalescer::RequestCoalescer;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

/// Origin errors are shared between every coalesced caller
pub type FetchError = Arc<BlobResolverError>;
type FetchResult = Result<Arc<Blob>, FetchError>;

/// Where blobs come from on a miss
#[async_trait]
pub trait BlobOrigin: Send + Sync {
    async fn fetch(&self, did: &str, cid: &str) -> Result<Blob, BlobResolverError>;
}

#[async_trait]
impl BlobOrigin for BlobResolver {
    async fn fetch(&self, did: &str, cid: &str) -> Result<Blob, BlobResolverError> {
        self.get_blob(did, cid).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    /// Served from cache while a refresh runs in the background
    Refresh,
    Miss,
}

impl CacheStatus {
    pub fn as_header(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Refresh => "REFRESH",
            CacheStatus::Miss => "MISS",
        }
    }
}

pub struct BlobService {
    store: Arc<CacheStore>,
    coalescer: Arc<RequestCoalescer<Arc<Blob>, FetchError>>,
    origin: Arc<dyn BlobOrigin>,
}

impl BlobService {
    pub fn new(
        store: Arc<CacheStore>,
        coalescer: Arc<RequestCoalescer<Arc<Blob>, FetchError>>,
        origin: Arc<dyn BlobOrigin>,
    ) -> Self {
        Self {
            store,
            coalescer,
            origin,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn coalescer(&self) -> &RequestCoalescer<Arc<Blob>, FetchError> {
        &self.coalescer
    }

    /// Generate a cache key from DID and CID
    pub fn cache_key(did: &str, cid: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}:{}", did, cid).as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Get a blob, from the cache when possible
    pub async fn get_blob(
        &self,
        did: &str,
        cid: &str,
    ) -> Result<(Arc<Blob>, CacheStatus), FetchError> {
        let key = Self::cache_key(did, cid);

        if let Some(entry) = self.store.get(&key).await {
            let status = if entry.is_early_fetch {
                self.refresh_in_background(key, did, cid);
                CacheStatus::Refresh
            } else {
                CacheStatus::Hit
            };
            let blob = Blob {
                data: entry.data,
                content_type: entry.content_type,
            };
            return Ok((Arc::new(blob), status));
        }

        let fetch = self.origin_fetch(key.clone(), did, cid);
        let blob = self.coalescer.execute(&key, fetch).await?;
        Ok((blob, CacheStatus::Miss))
    }

    /// Drop a cached blob; true if it was cached
    pub async fn purge(&self, did: &str, cid: &str) -> bool {
        self.store.delete(&Self::cache_key(did, cid)).await
    }

    fn refresh_in_background(&self, key: String, did: &str, cid: &str) {
        let coalescer = Arc::clone(&self.coalescer);
        let fetch = self.origin_fetch(key.clone(), did, cid);
        debug!(did, cid, "Refreshing blob ahead of expiry");

        tokio::spawn(async move {
            if let Err(e) = coalescer.execute(&key, fetch).await {
                warn!(key = %key, error = %e, "Background blob refresh failed");
            }
        });
    }

    /// Origin fetch that writes its result back into the cache
    fn origin_fetch(
        &self,
        key: String,
        did: &str,
        cid: &str,
    ) -> impl FnOnce() -> BoxFuture<'static, FetchResult> + Send + 'static {
        let store = Arc::clone(&self.store);
        let origin = Arc::clone(&self.origin);
        let did = did.to_string();
        let cid = cid.to_string();

        move || {
            async move {
                let blob = origin.fetch(&did, &cid).await.map_err(Arc::new)?;
                if !store.set(&key, &blob.data, &blob.content_type, None).await {
                    debug!(key = %key, size = blob.data.len(), "Fetched blob was not cached");
                }
                Ok(Arc::new(blob))
            }
            .boxed()
        }
    }
}
