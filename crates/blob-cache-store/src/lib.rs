//! Stampede-safe blob cache store
//!
//! Stores binary blobs with their metadata in a key/value backend (in-process
//! moka or shared Redis), with TTL expiration and probabilistic early
//! expiration so refreshes are spread out instead of all landing on the origin
//! when an entry expires.

mod backend;
mod error;
mod expiration;
mod store;
mod types;

pub use backend::{
    CacheBackend, MemoryBackend, MemoryBackendConfig, RawEntry, RedisBackend, ScanPage,
};
pub use error::{BackendError, BackendResult, CacheStoreError};
pub use expiration::{
    early_expiration_probability, should_fetch_early, FixedRandom, RandomSource, SeededRandom,
    ThreadRandom,
};
pub use store::CacheStore;
pub use types::{CacheEntry, CacheEntryMetadata, CacheStats, CacheStoreConfig};
