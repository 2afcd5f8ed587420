//! Cache store contract.

use std::time::Duration;

/// A bounded key-value store with per-entry expiry.
///
/// Reads may happen concurrently. Writers follow last-write-wins per key, and
/// eviction of the oldest entries happens atomically with the insertion that
/// exceeds capacity.
pub trait CacheStore<V>: Send + Sync
where
    V: Clone + Send + Sync,
{
    /// Returns a live (non-expired) value.
    fn get(&self, key: &str) -> Option<V>;

    /// Inserts or replaces a value that expires after `ttl`.
    fn set(&self, key: &str, value: V, ttl: Duration);

    /// Number of stored entries, including ones that expired but were not yet purged.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
