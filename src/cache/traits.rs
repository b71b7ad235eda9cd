//! Cache backend trait definition.

use crate::Result;

/// Trait for cache backends.
///
/// Backends store opaque encoded payloads; encoding, key prefixing, TTL
/// defaults and fudging are the facade's job. A backend returns `Err` for
/// transport or storage failures, which the facade reports and degrades to a
/// miss or `false`.
pub trait CacheBackend: Send + Sync {
    /// Short backend name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Fetches a payload.
    ///
    /// # Returns
    ///
    /// `None` when nothing is stored under `key` or the entry has expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores a payload for `ttl` seconds (already defaulted and fudged).
    ///
    /// # Returns
    ///
    /// True if the value was stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn set(&self, key: &str, payload: &[u8], ttl: u64) -> Result<bool>;

    /// Deletes the entry under `key`.
    ///
    /// # Returns
    ///
    /// True if the backend reports the delete as successful.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn delete(&self, key: &str) -> Result<bool>;
}
