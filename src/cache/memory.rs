//! In-process cache backend.
//!
//! Entries carry their own deadline and are dropped lazily on read. Pattern
//! deletion supports the glob forms used by the service: an exact key, or a
//! prefix followed by `*`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::cache::CacheBackend;
use crate::error::{AppError, Result};

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> Result<usize> {
        let entries = self.lock()?;
        let now = Instant::now();
        Ok(entries.values().filter(|(_, deadline)| *deadline > now).count())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>>> {
        self.entries
            .lock()
            .map_err(|_| AppError::Internal("Lock poisoned".to_string()))
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.lock()?;

        match entries.get(key) {
            Some((value, deadline)) if *deadline > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.lock()?
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        let mut entries = self.lock()?;
        let before = entries.len();

        match pattern.strip_suffix('*') {
            Some(prefix) => entries.retain(|key, _| !key.starts_with(prefix)),
            None => {
                entries.remove(pattern);
            }
        }

        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entries_expire() {
        let cache = MemoryCache::new();
        cache.set("a", "1", Duration::from_millis(20)).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some("1"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_pattern_removes_prefix_only() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("app:commits:1", "x", ttl).await.unwrap();
        cache.set("app:commits:2", "x", ttl).await.unwrap();
        cache.set("app:other", "x", ttl).await.unwrap();

        assert_eq!(cache.delete_pattern("app:commits:*").await.unwrap(), 2);
        assert_eq!(cache.len().unwrap(), 1);
        assert_eq!(cache.delete_pattern("app:other").await.unwrap(), 1);
    }
}
