//! Search result cache.
//!
//! Results are stored under `changelog:<version>:commits:<fingerprint>` where
//! the fingerprint is a SHA-256 over a canonical encoding of the whole
//! search request and the version is derived from the build, so entries
//! written by another release are never read back.
//!
//! - `flight`: per-key single-flight group for cache fills
//! - `redis`: Redis backend
//! - `memory`: in-process backend with expiry

pub mod flight;
pub mod memory;
pub mod redis;

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::models::SearchRequest;

pub use flight::SingleFlight;
pub use memory::MemoryCache;
pub use self::redis::RedisCache;

/// Lifetime of a cached search result.
pub const SEARCH_TTL: Duration = Duration::from_secs(60 * 60);

const SEARCH_NAMESPACE: &str = "commits";

static CACHE_PREFIX: LazyLock<String> = LazyLock::new(|| {
    let version = hex::encode(Sha256::digest(
        concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).as_bytes(),
    ));
    format!("changelog:{}", &version[..8])
});

/// Key-value store with expiry and pattern deletion.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` with its expiry in one operation.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Deletes every key matching a glob pattern (`prefix*`), returning how
    /// many were removed.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64>;
}

/// Prefixes `content` with the build-versioned namespace.
pub fn versioned_key(content: &str) -> String {
    format!("{}:{}", CACHE_PREFIX.as_str(), content)
}

pub fn search_key(request: &SearchRequest) -> String {
    versioned_key(&format!("{}:{}", SEARCH_NAMESPACE, fingerprint(request)))
}

/// Pattern matching every cached search result.
pub fn search_pattern() -> String {
    versioned_key(&format!("{}:*", SEARCH_NAMESPACE))
}

/// SHA-256 of the request's canonical encoding, hex-encoded.
///
/// Every field is length-prefixed so adjacent fields cannot bleed into each
/// other; filters are encoded in key order with sorted values.
pub fn fingerprint(request: &SearchRequest) -> String {
    let mut stream = Stream::default();

    stream.write(&request.query);
    let filters: Vec<_> = request.filters.iter().collect();
    stream.write(&filters.len().to_string());
    for (key, values) in filters {
        stream.write(key.as_str());
        stream.write(&values.len().to_string());
        for value in values {
            stream.write(value);
        }
    }
    stream.write(&request.before);
    stream.write(&request.after);
    stream.write(&request.page_size.to_string());
    stream.write(&request.last);

    stream.finish()
}

#[derive(Default)]
struct Stream(Sha256);

impl Stream {
    fn write(&mut self, field: &str) {
        self.0.update((field.len() as u64).to_be_bytes());
        self.0.update(field.as_bytes());
    }

    fn finish(self) -> String {
        hex::encode(self.0.finalize())
    }
}
