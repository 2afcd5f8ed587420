//! Bounded in-memory cache with per-entry expiry.

use cade_core::cache::CacheStore;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
    /// Insertion order; the smallest is evicted first.
    seq: u64,
}

struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    next_seq: u64,
}

/// `CacheStore` holding at most `max_entries` values.
///
/// When full, an insertion first drops expired entries and then, if still
/// needed, the oldest insertion. Replacing a key refreshes its position.
pub struct InMemoryCacheStore<V> {
    inner: RwLock<Inner<V>>,
    max_entries: usize,
}

impl<V> InMemoryCacheStore<V> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                next_seq: 0,
            }),
            max_entries: max_entries.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    /// Drops expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut inner = self.write();
        let before = inner.entries.len();
        let now = Instant::now();
        inner.entries.retain(|_, e| e.expires_at > now);
        before - inner.entries.len()
    }

    pub fn clear(&self) {
        self.write().entries.clear();
    }

    // A panicking writer cannot leave an entry half-written, so poisoned locks are reused.
    fn read(&self) -> RwLockReadGuard<'_, Inner<V>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner<V>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl<V> CacheStore<V> for InMemoryCacheStore<V>
where
    V: Clone + Send + Sync,
{
    fn get(&self, key: &str) -> Option<V> {
        let inner = self.read();
        let entry = inner.entries.get(key)?;
        (entry.expires_at > Instant::now()).then(|| entry.value.clone())
    }

    fn set(&self, key: &str, value: V, ttl: Duration) {
        let now = Instant::now();
        let mut inner = self.write();

        if !inner.entries.contains_key(key) && inner.entries.len() >= self.max_entries {
            inner.entries.retain(|_, e| e.expires_at > now);
            while inner.entries.len() >= self.max_entries {
                let oldest = inner
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| e.seq)
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(k) => {
                        inner.entries.remove(&k);
                    }
                    None => break,
                }
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
                seq,
            },
        );
    }

    fn len(&self) -> usize {
        self.read().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(300);

    #[test]
    fn test_get_set_last_write_wins() {
        let cache = InMemoryCacheStore::new(10);
        cache.set("a", 1, TTL);
        cache.set("a", 2, TTL);
        assert_eq!(cache.get("a"), Some(2));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_expired_entries_are_invisible() {
        let cache = InMemoryCacheStore::new(10);
        cache.set("old", "v".to_string(), Duration::ZERO);
        assert_eq!(cache.get("old"), None);
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_evicts_oldest_when_full() {
        let cache = InMemoryCacheStore::new(3);
        cache.set("a", 1, TTL);
        cache.set("b", 2, TTL);
        cache.set("c", 3, TTL);
        cache.set("d", 4, TTL);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("d"), Some(4));
    }

    #[test]
    fn test_expired_entries_are_evicted_before_live_ones() {
        let cache = InMemoryCacheStore::new(2);
        cache.set("live", 1, TTL);
        cache.set("stale", 2, Duration::ZERO);
        cache.set("new", 3, TTL);

        assert_eq!(cache.get("live"), Some(1));
        assert_eq!(cache.get("new"), Some(3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_replacing_key_refreshes_position() {
        let cache = InMemoryCacheStore::new(2);
        cache.set("a", 1, TTL);
        cache.set("b", 2, TTL);
        cache.set("a", 10, TTL);
        cache.set("c", 3, TTL);

        assert_eq!(cache.get("a"), Some(10));
        assert_eq!(cache.get("b"), None);
    }
}
