//! In-process cache store
//!
//! Backs the cache client for local runs and tests. Entries expire lazily:
//! an expired entry is evicted on the read that observes it.

use crate::{CacheResult, CacheStore};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryEntry {
    fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Concurrent in-memory key/value store with per-entry TTL
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    store: DashMap<String, MemoryEntry>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a live entry exists for `key`
    pub fn contains(&self, key: &str) -> bool {
        self.store
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false)
    }

    /// Keys of all live entries, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .store
            .iter()
            .filter(|entry| !entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Glob match where `*` spans any run of characters, as in Redis `SCAN MATCH`
fn matches_pattern(pattern: &str, key: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(head) = parts.next() else {
        return key.is_empty();
    };
    let Some(mut rest) = key.strip_prefix(head) else {
        return false;
    };

    let tail: Vec<&str> = parts.collect();
    let Some((last, middle)) = tail.split_last() else {
        return rest.is_empty();
    };
    for part in middle {
        match rest.find(part) {
            Some(at) => rest = &rest[at + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}

#[async_trait::async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get_raw(&self, key: &str) -> CacheResult<Option<String>> {
        let value = match self.store.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            Some(_) => None,
            None => return Ok(None),
        };

        if value.is_none() {
            // Expired: evict once the read guard is released
            self.store.remove_if(key, |_, entry| entry.is_expired());
        }
        Ok(value)
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        self.store
            .insert(key.to_string(), MemoryEntry::new(value, ttl));
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        self.store.remove(key);
        Ok(())
    }

    async fn del_pattern(&self, pattern: &str) -> CacheResult<usize> {
        let before = self.store.len();
        self.store.retain(|key, _| !matches_pattern(pattern, key));
        let deleted = before.saturating_sub(self.store.len());

        debug!(pattern = %pattern, deleted, "Memory cache pattern delete");
        Ok(deleted)
    }

    async fn incr(&self, key: &str, ttl: Duration) -> CacheResult<i64> {
        let count = match self.store.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                let current = if entry.is_expired() {
                    entry.expires_at = Instant::now() + ttl;
                    0
                } else {
                    entry.value.parse::<i64>().unwrap_or(0)
                };
                let next = current + 1;
                entry.value = next.to_string();
                next
            }
            Entry::Vacant(vacant) => {
                vacant.insert(MemoryEntry::new("1".to_string(), ttl));
                1
            }
        };
        Ok(count)
    }

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }
}
