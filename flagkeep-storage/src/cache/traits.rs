//! Cache trait and statistics.
//!
//! This module defines the contract a flag cache must honor. The flag store
//! only ever talks to its cache through [`FlagCache`], so tests and
//! alternative backends can be injected in place of [`super::ExpiringCache`].

use flagkeep_core::Flag;

/// A bounded, time-to-live keyed cache mapping flag name to a [`Flag`]
/// snapshot.
///
/// # Concurrency Contract
///
/// Implementations are shared by every concurrent caller. Each of `add`,
/// `get` and `remove` is mutually exclusive with the others and must never
/// block on I/O. The cache has no knowledge of the persistent store and
/// offers no transactional guarantees.
pub trait FlagCache: Send + Sync {
    /// Insert or overwrite the entry for `flag.name`, resetting its expiry.
    ///
    /// Returns `true` if another entry had to be evicted to make room.
    fn add(&self, flag: Flag) -> bool;

    /// Look up a flag. Entries past their time-to-live are removed and
    /// reported as a miss.
    fn get(&self, name: &str) -> Option<Flag>;

    /// Remove the entry for `name`. Returns whether an entry was present.
    fn remove(&self, name: &str) -> bool;

    /// Number of entries currently held, including ones not yet lazily
    /// expired.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    fn purge(&self);

    /// Get cache statistics.
    fn stats(&self) -> CacheStats;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses, including expired entries.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Number of evictions due to capacity.
    pub evictions: u64,
    /// Number of entries dropped because their time-to-live elapsed.
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
