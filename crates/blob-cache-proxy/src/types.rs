//! Core types for the blob cache proxy

use blob_cache_store::{CacheStats, CacheStoreConfig, MemoryBackendConfig};
use request_coalescer::CoalescerConfig;
use serde::Serialize;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for the proxy, read from the environment
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    /// Shared Redis backend; the in-process backend is used when unset
    pub redis_url: Option<String>,
    pub plc_directory_url: String,
    pub cache: CacheStoreConfig,
    pub coalescer: CoalescerConfig,
    pub memory_backend: MemoryBackendConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            redis_url: None,
            plc_directory_url: atproto_blob_resolver::resolver::DEFAULT_PLC_DIRECTORY_URL
                .to_string(),
            cache: CacheStoreConfig::default(),
            coalescer: CoalescerConfig::default(),
            memory_backend: MemoryBackendConfig::default(),
        }
    }
}

impl ProxyConfig {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Parse configuration from any variable lookup; unparsable values keep defaults
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: FromStr>(value: Option<String>) -> Option<T> {
            value.and_then(|s| s.trim().parse().ok())
        }

        let defaults = Self::default();

        let cache = CacheStoreConfig {
            prefix: var("CACHE_PREFIX").unwrap_or(defaults.cache.prefix),
            default_ttl: parsed(var("CACHE_TTL_SECS"))
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache.default_ttl),
            max_blob_size: parsed(var("MAX_BLOB_SIZE")).unwrap_or(defaults.cache.max_blob_size),
            beta: parsed(var("CACHE_BETA")).unwrap_or(defaults.cache.beta),
            scan_batch_size: defaults.cache.scan_batch_size,
        };

        let coalescer = CoalescerConfig {
            max_wait_time: parsed(var("COALESCE_MAX_WAIT_MS"))
                .map(Duration::from_millis)
                .unwrap_or(defaults.coalescer.max_wait_time),
        };

        let memory_backend = MemoryBackendConfig {
            max_capacity_bytes: parsed(var("MEMORY_CACHE_MAX_BYTES"))
                .unwrap_or(defaults.memory_backend.max_capacity_bytes),
        };

        Self {
            port: parsed(var("PORT")).unwrap_or(defaults.port),
            redis_url: var("REDIS_URL").filter(|url| !url.trim().is_empty()),
            plc_directory_url: var("PLC_DIRECTORY_URL").unwrap_or(defaults.plc_directory_url),
            cache,
            coalescer,
            memory_backend,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub backend: &'static str,
    pub cache: CacheStats,
    pub in_flight: usize,
    pub waiting_callers: usize,
}

/// Response to a namespace clear
#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub removed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> ProxyConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ProxyConfig::from_vars(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = config_from(&[]);
        assert_eq!(config.port, 3001);
        assert!(config.redis_url.is_none());
        assert_eq!(config.plc_directory_url, "https://plc.directory");
        assert_eq!(config.cache.prefix, "blob:");
        assert_eq!(config.cache.default_ttl, Duration::from_secs(24 * 60 * 60));
        assert_eq!(config.cache.max_blob_size, 10 * 1024 * 1024);
        assert_eq!(config.cache.beta, 1.0);
        assert_eq!(config.coalescer.max_wait_time, Duration::from_secs(30));
    }

    #[test]
    fn test_config_from_vars() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("REDIS_URL", "redis://cache:6379"),
            ("CACHE_PREFIX", "media:"),
            ("CACHE_TTL_SECS", "600"),
            ("MAX_BLOB_SIZE", "1048576"),
            ("CACHE_BETA", "1.5"),
            ("COALESCE_MAX_WAIT_MS", "5000"),
            ("MEMORY_CACHE_MAX_BYTES", "1024"),
        ]);

        assert_eq!(config.port, 8080);
        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.cache.prefix, "media:");
        assert_eq!(config.cache.default_ttl, Duration::from_secs(600));
        assert_eq!(config.cache.max_blob_size, 1_048_576);
        assert_eq!(config.cache.beta, 1.5);
        assert_eq!(config.coalescer.max_wait_time, Duration::from_millis(5000));
        assert_eq!(config.memory_backend.max_capacity_bytes, 1024);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = config_from(&[
            ("PORT", "not-a-port"),
            ("CACHE_TTL_SECS", "0"),
            ("CACHE_BETA", "high"),
            ("REDIS_URL", "  "),
        ]);

        assert_eq!(config.port, 3001);
        assert_eq!(config.cache.default_ttl, Duration::from_secs(86400));
        assert_eq!(config.cache.beta, 1.0);
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "ok".to_string(),
            uptime_secs: 3600,
            backend: "memory",
            cache: CacheStats {
                key_count: 100,
                memory_usage: 50_000_000,
                hits: 500,
                misses: 50,
                early_fetches: 5,
            },
            in_flight: 2,
            waiting_callers: 7,
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["uptime_secs"], 3600);
        assert_eq!(json["cache"]["hits"], 500);
        assert_eq!(json["waiting_callers"], 7);
    }
}
