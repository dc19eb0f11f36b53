//! Core boundary of the changelog service.
//!
//! `Changelog` exposes the four operations the HTTP layer needs: `save`,
//! `search`, `list_filters` and `refresh`. Searches go through a read-through
//! cache keyed by the request fingerprint; concurrent identical misses are
//! coalesced so only one of them reaches the store. Every successful write
//! schedules a bulk delete of cached searches off the request path.
//!
//! A fill racing a write must not outlive it: each invalidation bumps a
//! generation counter, and a fill whose read started under an older
//! generation is either skipped or deleted again.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

use crate::cache::{self, CacheBackend, SingleFlight};
use crate::error::Result;
use crate::models::{Commit, CommitsList, FilterKey, FilterValues, SearchRequest};
use crate::store::CommitStore;

#[derive(Clone)]
pub struct Changelog {
    store: Arc<dyn CommitStore>,
    cache: Arc<dyn CacheBackend>,
    flights: Arc<SingleFlight<CommitsList>>,
    refresh_lock: Arc<Mutex<()>>,
    generation: Arc<AtomicU64>,
}

impl Changelog {
    pub fn new(store: Arc<dyn CommitStore>, cache: Arc<dyn CacheBackend>) -> Self {
        Self {
            store,
            cache,
            flights: Arc::new(SingleFlight::new()),
            refresh_lock: Arc::new(Mutex::new(())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Stores a commit. Cache invalidation runs in the background and its
    /// failure never fails the write.
    pub async fn save(&self, commit: Commit) -> Result<()> {
        self.store.save(&commit).await?;
        self.invalidate_searches();
        Ok(())
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<CommitsList> {
        request.validate()?;

        let key = &cache::search_key(request);

        if let Some(list) = self.cached(key).await {
            tracing::debug!(key = %key, "search served from cache");
            return Ok(list);
        }

        self.flights
            .run(key, move || async move {
                // A fill may have completed between the first lookup and
                // joining the flight.
                if let Some(list) = self.cached(key).await {
                    return Ok(list);
                }

                tracing::debug!(key = %key, "search cache miss");
                let generation = self.generation.load(Ordering::SeqCst);
                let list = self.store.search(request).await?;
                self.fill(key, &list, generation).await;
                Ok(list)
            })
            .await
    }

    pub async fn list_filters(&self) -> Result<FilterValues> {
        self.store.list_filters().await
    }

    pub async fn list_filter(&self, key: FilterKey) -> Result<Vec<String>> {
        self.store.list_filter(key).await
    }

    /// Rebuilds the lexeme and filter indexes. Calls are serialized: a
    /// refresh requested while another runs waits for it to finish.
    pub async fn refresh(&self) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;

        tracing::info!("refreshing lexeme and filter indexes");
        self.store.refresh().await?;
        tracing::info!("lexeme and filter indexes refreshed");

        self.invalidate_searches();
        Ok(())
    }

    /// Cached result for `key`. Read or decode failures count as a miss.
    async fn cached(&self, key: &str) -> Option<CommitsList> {
        let raw = match self.cache.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(key, error = %e, "search cache read failed");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(list) => Some(list),
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding undecodable cache entry");
                None
            }
        }
    }

    /// Caches `list`, read from the store under `generation`.
    async fn fill(&self, key: &str, list: &CommitsList, generation: u64) {
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(key, "store changed during search, not caching");
            return;
        }

        let payload = match serde_json::to_string(list) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(key, error = %e, "unable to encode search result");
                return;
            }
        };

        if let Err(e) = self.cache.set(key, &payload, cache::SEARCH_TTL).await {
            tracing::warn!(key, error = %e, "search cache write failed");
            return;
        }

        // An invalidation may have run between the check and the write.
        if self.generation.load(Ordering::SeqCst) != generation {
            if let Err(e) = self.cache.delete_pattern(key).await {
                tracing::error!(key, error = %e, "unable to drop outdated search result");
            }
        }
    }

    fn invalidate_searches(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let backend = Arc::clone(&self.cache);

        tokio::spawn(async move {
            match backend.delete_pattern(&cache::search_pattern()).await {
                Ok(removed) => tracing::debug!(removed, "search cache invalidated"),
                Err(e) => tracing::error!(error = %e, "unable to invalidate search cache"),
            }
        });
    }
}
