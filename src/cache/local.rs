//! Local accelerator cache backend.
//!
//! A bounded LRU shared by every facade in the process. Entries past their
//! TTL are treated as misses and evicted on access; capacity pressure evicts
//! the least recently used entry.

use super::CacheBackend;
use crate::Result;
use crate::sqlite::acquire_lock;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    payload: Vec<u8>,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

/// Bounded in-process LRU cache.
pub struct LocalCacheBackend {
    entries: Mutex<LruCache<String, Entry>>,
}

impl LocalCacheBackend {
    /// Creates a backend holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of live or not-yet-evicted entries.
    #[must_use]
    pub fn len(&self) -> usize {
        acquire_lock(&self.entries).len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheBackend for LocalCacheBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut entries = acquire_lock(&self.entries);
        let expired = match entries.get(key) {
            None => return Ok(None),
            Some(entry) if entry.expires_at.is_none_or(|at| at > Instant::now()) => {
                return Ok(Some(entry.payload.clone()));
            },
            Some(_) => true,
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    fn set(&self, key: &str, payload: &[u8], ttl: u64) -> Result<bool> {
        let entry = Entry {
            payload: payload.to_vec(),
            expires_at: Instant::now().checked_add(Duration::from_secs(ttl)),
        };
        acquire_lock(&self.entries).put(key.to_string(), entry);
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(acquire_lock(&self.entries).pop(key).is_some())
    }
}
