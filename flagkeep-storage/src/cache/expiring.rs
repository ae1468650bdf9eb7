//! In-memory LRU cache with per-entry time-to-live.

use std::num::NonZeroUsize;
use std::time::Duration;

use flagkeep_core::Flag;
use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::traits::{CacheStats, FlagCache};

const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1024) {
    Some(capacity) => capacity,
    None => panic!("default cache capacity must be non-zero"),
};

/// Configuration for the expiring cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of flags held before least-recently-used eviction.
    pub capacity: NonZeroUsize,
    /// How long an entry stays valid after it was last added.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            ttl: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the capacity.
    pub fn with_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

struct Entry {
    flag: Flag,
    expires_at: Instant,
}

struct Inner {
    entries: LruCache<String, Entry>,
    stats: CacheStats,
}

/// Bounded LRU cache whose entries expire a fixed time after insertion.
///
/// Expiry is lazy: an expired entry occupies its slot until it is read,
/// removed, or pushed out by LRU eviction.
pub struct ExpiringCache {
    inner: Mutex<Inner>,
    ttl: Duration,
}

impl ExpiringCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(config.capacity),
                stats: CacheStats::default(),
            }),
            ttl: config.ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().entries.cap().get()
    }
}

impl Default for ExpiringCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl FlagCache for ExpiringCache {
    fn add(&self, flag: Flag) -> bool {
        let name = flag.name.clone();
        let entry = Entry {
            flag,
            expires_at: Instant::now() + self.ttl,
        };

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        // `push` hands back either the replaced value for the same key or the
        // least-recently-used entry it evicted.
        let evicted = matches!(
            inner.entries.push(name.clone(), entry),
            Some((old_key, _)) if old_key != name
        );
        if evicted {
            inner.stats.evictions += 1;
        }
        evicted
    }

    fn get(&self, name: &str) -> Option<Flag> {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let expired = match inner.entries.get(name) {
            Some(entry) if entry.expires_at > now => {
                let flag = entry.flag.clone();
                inner.stats.hits += 1;
                return Some(flag);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            inner.entries.pop(name);
            inner.stats.expirations += 1;
        }
        inner.stats.misses += 1;
        None
    }

    fn remove(&self, name: &str) -> bool {
        self.inner.lock().entries.pop(name).is_some()
    }

    fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    fn purge(&self) {
        self.inner.lock().entries.clear();
    }

    fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entry_count: inner.entries.len() as u64,
            ..inner.stats.clone()
        }
    }
}
