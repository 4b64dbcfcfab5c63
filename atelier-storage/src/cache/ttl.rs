//! Keyed memoization with fixed expiry.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use atelier_core::{AtelierResult, Timestamp};
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::freshness::{CacheRead, EntryState};
use super::stats::{CacheStats, StatsCounters};

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    stored_at: Timestamp,
}

impl CacheEntry {
    fn read<T: Clone + 'static>(&self) -> Option<CacheRead<T>> {
        self.value
            .downcast_ref::<T>()
            .map(|value| CacheRead::from_cache(value.clone(), self.stored_at))
    }
}

/// String-keyed cache whose entries expire a fixed time after they were
/// stored.
///
/// Freshness is strict: an entry whose age has reached the TTL is never
/// served, and it is replaced only by a successful refetch. A failed fetch
/// stores nothing and leaves any previous entry in place.
///
/// The map lock is held only for lookups and stores, never across a fetch.
/// Concurrent misses on one key may therefore each call their fetcher; the
/// last successful store wins.
///
/// Entries may hold values of any `Clone + Send + Sync + 'static` type. A
/// key read back as a different type than it was stored with is a miss.
pub struct TtlCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
    counters: StatsCounters,
}

impl TtlCache {
    /// Create a cache driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a cache driven by the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
            counters: StatsCounters::default(),
        }
    }

    /// Return the live value for `key`, or call `fetch`, store its result and
    /// return it.
    pub async fn get_or_fetch<T, F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> AtelierResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = AtelierResult<T>>,
    {
        self.read(key, ttl, fetch).await.map(CacheRead::into_value)
    }

    /// Like [`TtlCache::get_or_fetch`], keeping hit/miss and storage time.
    pub async fn read<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> AtelierResult<CacheRead<T>>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = AtelierResult<T>>,
    {
        if let Some(hit) = self.lookup::<T>(key, ttl) {
            self.counters.hit();
            trace!(cache_key = key, "cache hit");
            return Ok(hit);
        }

        self.counters.miss();
        trace!(cache_key = key, "cache miss");

        match fetch().await {
            Ok(value) => {
                let stored_at = self.clock.now();
                self.entries_mut().insert(
                    key.to_string(),
                    CacheEntry {
                        value: Arc::new(value.clone()),
                        stored_at,
                    },
                );
                Ok(CacheRead::from_fetch(value, stored_at))
            }
            Err(e) => {
                self.counters.fetch_failed();
                debug!(cache_key = key, error = %e, "cache fetch failed; nothing stored");
                Err(e)
            }
        }
    }

    /// Inspect an entry regardless of its age.
    pub fn peek<T: Clone + 'static>(&self, key: &str) -> Option<CacheRead<T>> {
        self.entries().get(key).and_then(CacheEntry::read)
    }

    /// Classify `key` against `ttl` as of now.
    pub fn state(&self, key: &str, ttl: Duration) -> EntryState {
        let now = self.clock.now();
        match self.entries().get(key) {
            Some(entry) => EntryState::for_age(age(now, entry.stored_at), ttl),
            None => EntryState::Absent,
        }
    }

    /// Remove one entry. Returns whether it existed.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.entries_mut().remove(key).is_some();
        if removed {
            debug!(cache_key = key, "cache entry invalidated");
        }
        removed
    }

    /// Remove every entry. Returns how many there were.
    pub fn clear_all(&self) -> usize {
        let mut entries = self.entries_mut();
        let count = entries.len();
        entries.clear();
        debug!(count, "cache cleared");
        count
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.len())
    }

    fn lookup<T: Clone + 'static>(&self, key: &str, ttl: Duration) -> Option<CacheRead<T>> {
        let now = self.clock.now();
        let entries = self.entries();
        let entry = entries.get(key)?;
        match EntryState::for_age(age(now, entry.stored_at), ttl) {
            EntryState::Fresh => entry.read(),
            _ => None,
        }
    }

    // Entries are plain data, so a poisoned lock is still consistent.
    fn entries(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn entries_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TtlCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("entries", &self.len())
            .field("clock", &self.clock)
            .finish()
    }
}

fn age(now: Timestamp, stored_at: Timestamp) -> Duration {
    (now - stored_at).to_std().unwrap_or(Duration::ZERO)
}

// ============================================================================
// TESTS
// ============================================================================
