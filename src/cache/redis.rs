//! Redis cache backend.
//!
//! Uses a multiplexed `ConnectionManager`, which reconnects on its own and is
//! cheap to clone per call. Values are written with `SET .. EX` so a value
//! never exists without its expiry.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::cache::CacheBackend;
use crate::error::{AppError, Result};

const SCAN_BATCH: usize = 100;

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(AppError::cache("open"))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(AppError::cache("connect"))?;

        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(AppError::cache("get"))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(AppError::cache("set"))
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(AppError::cache("scan"))?;

            if !keys.is_empty() {
                let count: u64 = conn.del(&keys).await.map_err(AppError::cache("delete"))?;
                removed += count;
            }

            if next == 0 {
                return Ok(removed);
            }
            cursor = next;
        }
    }
}
