//! Freshness metadata for cache reads.
//!
//! A read is either served from a live entry or fetched anew; callers that
//! care can tell the two apart through [`CacheRead`].

use std::time::Duration;

use atelier_core::Timestamp;

/// Lifecycle state of one cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// No entry stored.
    Absent,
    /// Entry younger than the TTL.
    Fresh,
    /// Entry at or past the TTL; the next read refetches.
    Stale,
}

impl EntryState {
    /// Classify an entry of the given age.
    pub fn for_age(age: Duration, ttl: Duration) -> Self {
        if age < ttl {
            Self::Fresh
        } else {
            Self::Stale
        }
    }
}

/// Result of a cache read, carrying staleness metadata.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    /// The cached value.
    value: T,
    /// When this value was stored.
    stored_at: Timestamp,
    /// Whether this was a cache hit or miss.
    was_cache_hit: bool,
}

impl<T> CacheRead<T> {
    /// A read served from a stored entry.
    pub fn from_cache(value: T, stored_at: Timestamp) -> Self {
        Self {
            value,
            stored_at,
            was_cache_hit: true,
        }
    }

    /// A read that had to call the fetcher.
    pub fn from_fetch(value: T, stored_at: Timestamp) -> Self {
        Self {
            value,
            stored_at,
            was_cache_hit: false,
        }
    }

    /// Consume the wrapper and return the underlying value.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Get a reference to the underlying value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Get when this value was stored.
    pub fn stored_at(&self) -> Timestamp {
        self.stored_at
    }

    /// Check if this was a cache hit.
    pub fn was_cache_hit(&self) -> bool {
        self.was_cache_hit
    }

    /// Check if this was a cache miss.
    pub fn was_cache_miss(&self) -> bool {
        !self.was_cache_hit
    }
}
