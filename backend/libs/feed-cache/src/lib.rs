//! Feed cache layer
//!
//! Typed key/value cache shared by the feed service components:
//! - Key schema for feeds, reactions and scoring entries
//! - TTL policy per entry family
//! - Redis and in-process backends behind one store trait
//! - Failures absorbed at the client so a cache outage degrades to the store
//! - Metrics integration

mod error;
mod keys;
mod metrics;

pub mod memory;
pub mod redis_store;

pub use error::{CacheError, CacheResult};
pub use keys::CacheKey;
pub use memory::MemoryCacheStore;
pub use metrics::CacheMetrics;
pub use redis_store::RedisCacheStore;

use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// TTL values (seconds)
pub mod ttl {
    pub const DEFAULT: u64 = 600; // 10 minutes
    pub const FEED: u64 = 1800; // 30 minutes
    pub const ENGAGEMENT: u64 = 1800; // 30 minutes
    pub const REACTION_COUNT: u64 = 900; // 15 minutes
    pub const REACTION_STATE: u64 = 1800; // 30 minutes
    pub const INTERACTION: u64 = 604_800; // 7 days
}

/// Raw string store the client serializes through
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    async fn get_raw(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()>;

    async fn del(&self, key: &str) -> CacheResult<()>;

    /// Delete every key matching a glob with a trailing `*`
    async fn del_pattern(&self, pattern: &str) -> CacheResult<usize>;

    /// Atomically increment an integer entry, creating it at 1 with `ttl`
    async fn incr(&self, key: &str, ttl: Duration) -> CacheResult<i64>;

    async fn ping(&self) -> CacheResult<()>;
}

/// Typed cache client
///
/// Values are stored as JSON. Every operation except `try_get` and `ping`
/// swallows backend failures after logging them, so callers treat an
/// unavailable cache as a miss.
#[derive(Clone)]
pub struct CacheClient {
    store: Arc<dyn CacheStore>,
    memory: Option<Arc<MemoryCacheStore>>,
    metrics: CacheMetrics,
    default_ttl: Duration,
}

impl CacheClient {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            memory: None,
            metrics: CacheMetrics::new(),
            default_ttl: Duration::from_secs(ttl::DEFAULT),
        }
    }

    /// Client over a fresh in-process store
    pub fn in_memory() -> Self {
        let memory = Arc::new(MemoryCacheStore::new());
        Self {
            store: memory.clone(),
            memory: Some(memory),
            metrics: CacheMetrics::new(),
            default_ttl: Duration::from_secs(ttl::DEFAULT),
        }
    }

    /// Client over a managed Redis connection
    pub async fn redis(url: &str) -> CacheResult<Self> {
        let store = RedisCacheStore::connect(url).await?;
        Ok(Self::new(Arc::new(store)))
    }

    /// Underlying in-process store, when the client was built with one
    pub fn memory(&self) -> Option<&MemoryCacheStore> {
        self.memory.as_deref()
    }

    /// Cached value for `key`, or `None` on miss, corrupt entry or backend error
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.get_raw(key).await {
            Ok(Some(data)) => match serde_json::from_str::<T>(&data) {
                Ok(value) => {
                    debug!(key = %key, "Cache hit");
                    self.metrics.record_hit(key);
                    Some(value)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Cache deserialization failed");
                    self.metrics.record_error(key, "deserialize");
                    // Drop the corrupted entry so the next read repopulates it
                    if let Err(e) = self.store.del(key).await {
                        warn!(key = %key, error = %e, "Failed to drop corrupted entry");
                    }
                    self.metrics.record_miss(key);
                    None
                }
            },
            Ok(None) => {
                debug!(key = %key, "Cache miss");
                self.metrics.record_miss(key);
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache get failed");
                self.metrics.record_error(key, "get");
                None
            }
        }
    }

    /// Like `get`, but surfaces backend and decode errors
    pub async fn try_get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        let result = match self.store.get_raw(key).await {
            Ok(Some(data)) => serde_json::from_str::<T>(&data)
                .map(Some)
                .map_err(CacheError::from),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };

        match &result {
            Ok(Some(_)) => self.metrics.record_hit(key),
            Ok(None) => self.metrics.record_miss(key),
            Err(_) => self.metrics.record_error(key, "try_get"),
        }
        result
    }

    /// Store `value` under the client's default TTL
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        self.set_with_ttl(key, value, self.default_ttl).await
    }

    pub async fn set_with_ttl<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        let data = match serde_json::to_string(value) {
            Ok(data) => data,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache serialization failed");
                self.metrics.record_error(key, "serialize");
                return;
            }
        };

        match self.store.set_raw(key, data, ttl).await {
            Ok(()) => {
                debug!(key = %key, ttl_secs = ttl.as_secs(), "Cache set");
                self.metrics.record_write(key);
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache set failed");
                self.metrics.record_error(key, "set");
            }
        }
    }

    /// Remove `key`; completes once the backend has acknowledged the delete
    pub async fn remove(&self, key: &str) {
        match self.store.del(key).await {
            Ok(()) => {
                debug!(key = %key, "Cache delete");
                self.metrics.record_invalidation(key);
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache delete failed");
                self.metrics.record_error(key, "delete");
            }
        }
    }

    pub async fn remove_many<S: AsRef<str>>(&self, keys: &[S]) {
        let deletes = keys.iter().map(|key| self.remove(key.as_ref()));
        futures::future::join_all(deletes).await;
    }

    /// Remove every key matching `pattern`, returning how many were deleted
    pub async fn remove_pattern(&self, pattern: &str) -> usize {
        match self.store.del_pattern(pattern).await {
            Ok(deleted) => {
                debug!(pattern = %pattern, deleted, "Cache pattern delete");
                self.metrics.record_invalidation(pattern);
                deleted
            }
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Cache pattern delete failed");
                self.metrics.record_error(pattern, "delete_pattern");
                0
            }
        }
    }

    /// Increment an integer entry; `None` when the backend is unavailable
    pub async fn increment(&self, key: &str, ttl: Duration) -> Option<i64> {
        match self.store.incr(key, ttl).await {
            Ok(count) => {
                self.metrics.record_write(key);
                Some(count)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache increment failed");
                self.metrics.record_error(key, "increment");
                None
            }
        }
    }

    pub async fn ping(&self) -> CacheResult<()> {
        self.store.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        id: u32,
        label: String,
    }

    /// Store whose every call fails
    struct BrokenStore;

    #[async_trait::async_trait]
    impl CacheStore for BrokenStore {
        async fn get_raw(&self, _key: &str) -> CacheResult<Option<String>> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn set_raw(&self, _key: &str, _value: String, _ttl: Duration) -> CacheResult<()> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn del(&self, _key: &str) -> CacheResult<()> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn del_pattern(&self, _pattern: &str) -> CacheResult<usize> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn incr(&self, _key: &str, _ttl: Duration) -> CacheResult<i64> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn ping(&self) -> CacheResult<()> {
            Err(CacheError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn test_typed_round_trip() {
        let cache = CacheClient::in_memory();
        let value = Sample {
            id: 7,
            label: "seven".into(),
        };
        cache.set("sample:7", &value).await;

        assert_eq!(cache.get::<Sample>("sample:7").await, Some(value));
        assert_eq!(cache.get::<Sample>("sample:8").await, None);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_dropped() {
        let cache = CacheClient::in_memory();
        cache.set("sample:1", "not a sample").await;

        assert_eq!(cache.get::<Sample>("sample:1").await, None);
        assert!(!cache.memory().unwrap().contains("sample:1"));
    }

    #[tokio::test]
    async fn test_try_get_surfaces_decode_error() {
        let cache = CacheClient::in_memory();
        cache.set("n", "abc").await;

        let result = cache.try_get::<i64>("n").await;
        assert!(matches!(result, Err(CacheError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_increment_reads_back_as_integer() {
        let cache = CacheClient::in_memory();
        let ttl = Duration::from_secs(ttl::INTERACTION);
        assert_eq!(cache.increment("interaction_a_b", ttl).await, Some(1));
        assert_eq!(cache.increment("interaction_a_b", ttl).await, Some(2));
        assert_eq!(cache.try_get::<i64>("interaction_a_b").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_remove_many_and_pattern() {
        let cache = CacheClient::in_memory();
        for key in ["a:1", "a:2", "b:1", "b:2"] {
            cache.set(key, &1).await;
        }

        cache.remove_many(&["a:1", "a:2"]).await;
        assert_eq!(cache.remove_pattern("b:*").await, 2);
        assert!(cache.memory().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failures_are_absorbed() {
        let cache = CacheClient::new(Arc::new(BrokenStore));

        cache.set("k", &1).await;
        cache.remove("k").await;
        assert_eq!(cache.get::<i64>("k").await, None);
        assert_eq!(cache.remove_pattern("k*").await, 0);
        assert_eq!(cache.increment("k", Duration::from_secs(1)).await, None);
        assert!(cache.try_get::<i64>("k").await.is_err());
        assert!(cache.ping().await.is_err());
        assert!(cache.memory().is_none());
    }
}
