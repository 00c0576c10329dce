//! Explicit read-through cache keyed by (resource, scope) with per-entry TTL
//! and invalidation hooks.
//!
//! Used for persona profiles, which are read on every classification but
//! change rarely. Invalidation is the persona update handler's job; TTL is
//! the backstop for writes that bypass this process.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

const DEFAULT_CAPACITY: usize = 256;

struct Entry<T> {
    value: T,
    inserted_at: Instant,
}

/// LRU cache with per-entry TTL, keyed by a resource name and a scope string
/// (e.g. an account id).
pub struct TtlCache<T> {
    inner: Mutex<LruCache<(String, String), Entry<T>>>,
    ttl: Duration,
}

impl<T: Clone> TtlCache<T> {
    /// Create a cache with the default capacity and the given TTL
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, ttl)
    }

    /// Create a cache with an explicit capacity and TTL
    pub fn with_capacity(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is non-zero");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Fetch a live entry, evicting it if expired
    pub fn get(&self, resource: &str, scope: &str) -> Option<T> {
        let mut cache = self.inner.lock().expect("cache lock");
        let key = (resource.to_string(), scope.to_string());

        match cache.get(&key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                cache.pop(&key);
                None
            }
            None => None,
        }
    }

    /// Insert or replace an entry
    pub fn insert(&self, resource: &str, scope: &str, value: T) {
        let mut cache = self.inner.lock().expect("cache lock");
        cache.put(
            (resource.to_string(), scope.to_string()),
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Explicitly drop an entry; called by write paths that change the
    /// underlying resource
    pub fn invalidate(&self, resource: &str, scope: &str) {
        let mut cache = self.inner.lock().expect("cache lock");
        cache.pop(&(resource.to_string(), scope.to_string()));
    }
}

/// Cache of persona profiles, keyed by account id
pub type PersonaCache = TtlCache<Option<crate::models::persona_profile::Model>>;

/// Resource name for persona entries
pub const PERSONA_RESOURCE: &str = "persona";
