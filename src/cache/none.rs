//! No-op cache backend.

use super::CacheBackend;
use crate::Result;

/// Backend that stores nothing: every `get` misses, every write succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoneCacheBackend;

impl CacheBackend for NoneCacheBackend {
    fn name(&self) -> &'static str {
        "none"
    }

    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn set(&self, _key: &str, _payload: &[u8], _ttl: u64) -> Result<bool> {
        Ok(true)
    }

    fn delete(&self, _key: &str) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_backend_never_hits() {
        let backend = NoneCacheBackend;
        assert!(backend.set("k", b"1", 60).unwrap());
        assert_eq!(backend.get("k").unwrap(), None);
        assert!(backend.delete("k").unwrap());
    }
}
