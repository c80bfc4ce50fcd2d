//! Process-local TTL cache for aggregation results.
//!
//! Every entry carries its own insertion timestamp and TTL. Reads check freshness against the
//! injected [`Clock`] and drop stale entries on the spot; [`sweep::spawn_sweeper`] removes the
//! ones nobody reads again. The backing moka map only provides concurrency and a hard
//! capacity bound, it never expires anything on its own.
//!
//! Invalidation bumps a generation counter. A value computed from data read before an
//! invalidation is stored with [`TtlCache::set_if_unchanged`] and is dropped instead of cached.

pub mod key;
pub mod sweep;

pub use key::generate_key;

use crate::clock::Clock;
use moka::sync::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub data: V,
    /// Insertion time, epoch milliseconds.
    pub timestamp: i64,
    /// Time to live, milliseconds.
    pub ttl: i64,
}

impl<V> CacheEntry<V> {
    pub fn is_fresh(&self, now_ms: i64) -> bool {
        now_ms - self.timestamp <= self.ttl
    }
}

pub struct TtlCache<V> {
    inner: Cache<String, CacheEntry<V>>,
    clock: Arc<dyn Clock>,
    generation: AtomicU64,
}

/// Cache of serialized JSON responses, the shape the analytics handlers store.
pub type ResponseCache = TtlCache<String>;

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(max_capacity: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Cache::builder().max_capacity(max_capacity).build(),
            clock,
            generation: AtomicU64::new(0),
        }
    }

    /// Store `value` under `key`, replacing whatever was there.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = CacheEntry {
            data: value,
            timestamp: self.clock.now_ms(),
            ttl: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
        };
        self.inner.insert(key.into(), entry);
    }

    /// Current invalidation generation. Read it before computing a value to cache.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Store `value` unless an invalidation ran since `generation` was read.
    /// Returns whether the value was kept.
    pub fn set_if_unchanged(
        &self,
        key: impl Into<String>,
        value: V,
        ttl: Duration,
        generation: u64,
    ) -> bool {
        let key = key.into();
        if self.generation() != generation {
            return false;
        }
        self.set(key.clone(), value, ttl);
        // An invalidation may have landed between the check and the insert.
        if self.generation() != generation {
            self.inner.invalidate(key.as_str());
            return false;
        }
        true
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let entry = self.inner.get(key)?;
        if entry.is_fresh(self.clock.now_ms()) {
            Some(entry.data)
        } else {
            self.inner.invalidate(key);
            None
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remove `key`. Returns whether an entry (fresh or not) was present.
    pub fn delete(&self, key: &str) -> bool {
        self.inner.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        for (key, _) in self.inner.iter() {
            self.inner.invalidate(key.as_str());
        }
    }

    /// Remove every key starting with `prefix`. Returns the number removed.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut removed = 0;
        for (key, _) in self.inner.iter() {
            if key.starts_with(prefix) && self.inner.remove(key.as_str()).is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// Eagerly drop every expired entry. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let now_ms = self.clock.now_ms();
        let mut removed = 0;
        for (key, entry) in self.inner.iter() {
            if !entry.is_fresh(now_ms) && self.inner.remove(key.as_str()).is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// Entries currently held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.inner.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
