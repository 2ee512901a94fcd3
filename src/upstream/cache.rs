//! TTL key-value cache for upstream access tokens.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// A thread-safe string cache with per-entry expiry.
///
/// Expired entries are dropped lazily on read, or in bulk by
/// [`TokenCache::purge_expired`].
#[derive(Clone, Default, Debug)]
pub struct TokenCache {
    inner: Arc<DashMap<String, CacheEntry>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a live value.
    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        if let Some(entry) = self.inner.get(key) {
            if entry.is_live(now) {
                return Some(entry.value.clone());
            }
        }
        // Ref dropped above; safe to take the write lock for the shard.
        self.inner.remove_if(key, |_, entry| !entry.is_live(now));
        None
    }

    /// Store a value for `ttl`.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>, ttl: Duration) {
        self.inner.insert(
            key.into(),
            CacheEntry {
                value: value.into(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Remove a value. Returns whether it existed.
    pub fn delete(&self, key: &str) -> bool {
        self.inner.remove(key).is_some()
    }

    /// Drop every expired entry and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut purged = 0;
        self.inner.retain(|_, entry| {
            let live = entry.is_live(now);
            if !live {
                purged += 1;
            }
            live
        });
        purged
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
