//! Shared backend on Redis

use super::{CacheBackend, RawEntry, ScanPage};
use crate::error::BackendResult;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

const SCAN_DONE: &str = "0";

/// Redis backend; the connection manager reconnects on its own
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    /// Connect to the server at `url` (e.g. `redis://localhost:6379`)
    pub async fn connect(url: &str) -> BackendResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Connected to Redis cache backend");
        Ok(Self { conn })
    }
}

/// Escape glob metacharacters so a key prefix matches literally
pub(crate) fn scan_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

/// Pull `used_memory` out of an `INFO memory` reply
pub(crate) fn parse_used_memory(info: &str) -> Option<u64> {
    info.lines()
        .find_map(|line| line.trim().strip_prefix("used_memory:"))
        .and_then(|value| value.trim().parse().ok())
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn read_entry(&self, meta_key: &str, data_key: &str) -> BackendResult<RawEntry> {
        let mut conn = self.conn.clone();
        let (fields, data): (HashMap<String, String>, Option<Vec<u8>>) = redis::pipe()
            .hgetall(meta_key)
            .get(data_key)
            .query_async(&mut conn)
            .await?;

        Ok(RawEntry {
            // HGETALL answers an empty map for a missing key
            fields: (!fields.is_empty()).then_some(fields),
            data,
        })
    }

    async fn write_entry(
        &self,
        meta_key: &str,
        fields: &[(&'static str, String)],
        data_key: &str,
        data: &[u8],
        ttl: Duration,
    ) -> BackendResult<()> {
        let mut conn = self.conn.clone();
        let secs = ttl.as_secs().max(1);
        let () = redis::pipe()
            .atomic()
            .del(meta_key)
            .ignore()
            .hset_multiple(meta_key, fields)
            .ignore()
            .expire(meta_key, secs as i64)
            .ignore()
            .set_ex(data_key, data, secs)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> BackendResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(keys).await?;
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> BackendResult<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn scan(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        count: usize,
    ) -> BackendResult<ScanPage> {
        let mut conn = self.conn.clone();
        let (next, keys): (String, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor.unwrap_or(SCAN_DONE))
            .arg("MATCH")
            .arg(scan_pattern(prefix))
            .arg("COUNT")
            .arg(count.max(1))
            .query_async(&mut conn)
            .await?;

        Ok(ScanPage {
            next: (next != SCAN_DONE).then_some(next),
            keys,
        })
    }

    async fn memory_usage(&self) -> BackendResult<u64> {
        let mut conn = self.conn.clone();
        let info: String = redis::cmd("INFO")
            .arg("memory")
            .query_async(&mut conn)
            .await?;
        Ok(parse_used_memory(&info).unwrap_or(0))
    }
}
