//! Blob Cache Proxy - stampede-safe caching proxy for AT Protocol blobs
//!
//! Blobs are cached with probabilistic early expiration, and concurrent
//! misses for the same blob share a single origin fetch.

mod error;
mod server;
mod service;
mod types;

use crate::error::Result;
use crate::server::{start_server, ServerState, SharedState};
use crate::service::BlobService;
use crate::types::ProxyConfig;
use atproto_blob_resolver::BlobResolver;
use blob_cache_store::{CacheBackend, CacheStore, MemoryBackend, RedisBackend};
use request_coalescer::RequestCoalescer;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter =
        EnvFilter::from_default_env().add_directive("blob_cache_proxy=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting Blob Cache Proxy...");

    let config = ProxyConfig::from_env();
    info!("Port: {}", config.port);
    info!("Cache prefix: {}", config.cache.prefix);
    info!("Cache TTL: {} seconds", config.cache.default_ttl.as_secs());
    info!(
        "Max blob size: {} MB",
        config.cache.max_blob_size / (1024 * 1024)
    );
    info!("Early expiration beta: {}", config.cache.beta);
    info!(
        "Coalesce max wait: {} ms",
        config.coalescer.max_wait_time.as_millis()
    );

    let backend_name = if config.redis_url.is_some() { "redis" } else { "memory" };
    let backend: Arc<dyn CacheBackend> = match &config.redis_url {
        Some(url) => {
            info!("Cache backend: redis");
            Arc::new(RedisBackend::connect(url).await?)
        }
        None => {
            info!(
                "Cache backend: memory ({} MB)",
                config.memory_backend.max_capacity_bytes / (1024 * 1024)
            );
            Arc::new(MemoryBackend::new(config.memory_backend.clone()))
        }
    };

    let store = Arc::new(CacheStore::new(backend, config.cache.clone()));
    let coalescer = Arc::new(RequestCoalescer::new(config.coalescer.clone()));
    let resolver = Arc::new(BlobResolver::with_plc_directory(&config.plc_directory_url));

    let service = BlobService::new(store, Arc::clone(&coalescer), resolver);
    let state: SharedState = Arc::new(ServerState::new(service, backend_name));

    start_server(state, config.port, shutdown_signal()).await?;

    let abandoned = coalescer.in_flight_count();
    coalescer.clear();
    info!(abandoned, "Shut down blob cache proxy");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
