//! Per-process variable cache backend.
//!
//! Holds data only for the lifetime of the process. Useful for unit tests,
//! CLI runs, and debugging, where a shared cache would hide behavior.

use super::CacheBackend;
use crate::Result;
use crate::sqlite::acquire_lock;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    payload: Vec<u8>,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Unbounded in-process map with per-entry expiry.
#[derive(Default)]
pub struct VariableCacheBackend {
    entries: Mutex<HashMap<String, Entry>>,
}

impl VariableCacheBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries. Expired entries count until a read or write
    /// prunes them.
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

impl CacheBackend for VariableCacheBackend {
    fn name(&self) -> &'static str {
        "variable"
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut entries = acquire_lock(&self.entries);
        if entries.get(key).is_some_and(|e| !e.is_live(Instant::now())) {
            entries.remove(key);
        }
        Ok(entries.get(key).map(|e| e.payload.clone()))
    }

    fn set(&self, key: &str, payload: &[u8], ttl: u64) -> Result<bool> {
        let now = Instant::now();
        let mut entries = acquire_lock(&self.entries);
        entries.retain(|_, entry| entry.is_live(now));
        entries.insert(
            key.to_string(),
            Entry {
                payload: payload.to_vec(),
                expires_at: now.checked_add(Duration::from_secs(ttl)),
            },
        );
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        acquire_lock(&self.entries).remove(key);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let backend = VariableCacheBackend::new();
        assert!(backend.set("a", b"payload", 60).unwrap());
        assert_eq!(backend.get("a").unwrap().as_deref(), Some(&b"payload"[..]));
        assert!(backend.delete("a").unwrap());
        assert_eq!(backend.get("a").unwrap(), None);
        // Deleting a missing key still succeeds.
        assert!(backend.delete("a").unwrap());
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let backend = VariableCacheBackend::new();
        backend.set("a", b"x", 0).unwrap();
        assert_eq!(backend.len(), 1);
        assert_eq!(backend.get("a").unwrap(), None);
        assert_eq!(backend.len(), 0);
    }

    #[test]
    fn test_set_prunes_expired_entries() {
        let backend = VariableCacheBackend::new();
        backend.set("old-1", b"x", 0).unwrap();
        backend.set("old-2", b"x", 0).unwrap();
        backend.set("fresh", b"y", 60).unwrap();
        assert_eq!(backend.len(), 1);
        assert!(backend.get("fresh").unwrap().is_some());
    }

    #[test]
    fn test_unrepresentable_ttl_never_expires() {
        let backend = VariableCacheBackend::new();
        assert!(backend.set("forever", b"v", u64::MAX).unwrap());
        assert_eq!(backend.get("forever").unwrap(), Some(b"v".to_vec()));
    }
}
