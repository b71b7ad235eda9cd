//! Cache facade.
//!
//! A [`Cache`] binds one backend kind to a key prefix and exposes typed
//! `get`/`set`/`delete`. Values are serialized with `serde_json`, so a stored
//! `false`, `0`, or `""` comes back as `Some(false)`, `Some(0)`, `Some("")`;
//! only a real miss is `None`.
//!
//! Backend failures never escape the facade: they are logged, counted, and
//! turned into a miss (`get`) or `false` (`set`/`delete`). The cache is
//! advisory; callers fall back to the source of truth.
//!
//! # Backends
//!
//! | Kind | Storage |
//! |------|---------|
//! | `None` | Nothing; every read misses |
//! | `Variable` | Per-process map |
//! | `Local` | Bounded in-process LRU |
//! | `Distributed` | Redis (`redis` feature) |
//! | `Table` | Chunked rows in 16 `SQLite` shard tables |
//! | `Object` | Enveloped objects under `s3://bucket/path` keys |

mod local;
mod none;
mod object;
mod redis;
mod registry;
mod table;
mod traits;
mod variable;

pub use local::LocalCacheBackend;
pub use none::NoneCacheBackend;
pub use object::{
    FilesystemObjectStore, OBJECT_KEY_SCHEME, ObjectCacheBackend, ObjectStore, parse_object_key,
    round_ttl_to_days,
};
pub use redis::RedisCacheBackend;
pub use registry::CacheRegistry;
pub use table::TableCacheBackend;
pub use traits::CacheBackend;
pub use variable::VariableCacheBackend;

use crate::config::DEFAULT_CACHE_TTL;
use crate::observability::record_operation_metrics;
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Lower bound of the TTL fudge factor.
pub const FUDGE_MIN: f64 = 0.95;

/// Upper bound of the TTL fudge factor.
pub const FUDGE_MAX: f64 = 1.05;

/// Closed set of cache backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackendKind {
    /// No caching.
    None,
    /// Per-process map.
    Variable,
    /// Bounded in-process accelerator.
    Local,
    /// Network key-value store.
    Distributed,
    /// Chunked relational table.
    Table,
    /// Bucket-scoped object store.
    Object,
}

impl CacheBackendKind {
    /// Returns the kind as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Variable => "variable",
            Self::Local => "local",
            Self::Distributed => "distributed",
            Self::Table => "table",
            Self::Object => "object",
        }
    }

    /// Parses a kind name, case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "variable" => Some(Self::Variable),
            "local" => Some(Self::Local),
            "distributed" | "redis" => Some(Self::Distributed),
            "table" => Some(Self::Table),
            "object" | "s3" => Some(Self::Object),
            _ => None,
        }
    }

    /// Object-store keys address a location and are never namespaced.
    #[must_use]
    pub const fn uses_prefix(self) -> bool {
        !matches!(self, Self::Object)
    }
}

impl fmt::Display for CacheBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache bypass switch for one facade.
///
/// `WriteOnly` and `ReadOnly` are debugging aids and only take effect in
/// development mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Reads and writes go to the backend.
    #[default]
    Normal,
    /// Use the no-op backend.
    Disabled,
    /// Reads always miss; writes go through.
    WriteOnly,
    /// Reads go through; writes are refused.
    ReadOnly,
}

/// Resolves a TTL of 0 to the default of one day.
#[must_use]
pub const fn effective_ttl(ttl: u64) -> u64 {
    if ttl == 0 { DEFAULT_CACHE_TTL } else { ttl }
}

/// Scales `ttl` by `factor`, rounding up, and keeps the result inside
/// `[ceil(ttl * 0.95), floor(ttl * 1.05)]` (never below 1).
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn fudge_ttl_with(ttl: u64, factor: f64) -> u64 {
    let factor = factor.clamp(FUDGE_MIN, FUDGE_MAX);
    let base = ttl as f64;
    let lower = (base * FUDGE_MIN).ceil() as u64;
    let upper = ((base * FUDGE_MAX).floor() as u64).max(lower);
    let scaled = (base * factor).ceil() as u64;
    scaled.clamp(lower, upper).max(1)
}

/// Scales `ttl` by a random factor in `[0.95, 1.05]` so that entries written
/// together do not all expire together.
#[must_use]
pub fn fudge_ttl(ttl: u64) -> u64 {
    let factor = rand::random::<f64>().mul_add(FUDGE_MAX - FUDGE_MIN, FUDGE_MIN);
    fudge_ttl_with(ttl, factor)
}

/// Typed cache access over one backend with a key prefix.
///
/// ```rust
/// use argos_data::cache::{Cache, CacheBackendKind, CacheRegistry};
/// use argos_data::config::CacheSettings;
///
/// let registry = CacheRegistry::new(CacheSettings::default(), false);
/// let cache = Cache::new(&registry, CacheBackendKind::Variable, "users").unwrap();
///
/// assert!(cache.set("flag", &false, 60, false));
/// assert_eq!(cache.get::<bool>("flag"), Some(false));
/// assert_eq!(cache.get::<bool>("absent"), None);
/// ```
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
    kind: CacheBackendKind,
    prefix: String,
    mode: CacheMode,
    dev_mode: bool,
}

impl Cache {
    /// Creates a facade using the registry's configured [`CacheMode`].
    ///
    /// # Errors
    ///
    /// Returns the registry's error if the backend cannot be created; see
    /// [`CacheRegistry::backend`].
    pub fn new(registry: &CacheRegistry, kind: CacheBackendKind, key_prefix: &str) -> Result<Self> {
        Self::with_mode(registry, kind, key_prefix, registry.settings().mode)
    }

    /// Creates a facade with an explicit [`CacheMode`] for this caller.
    ///
    /// # Errors
    ///
    /// See [`Cache::new`].
    pub fn with_mode(
        registry: &CacheRegistry,
        kind: CacheBackendKind,
        key_prefix: &str,
        mode: CacheMode,
    ) -> Result<Self> {
        let kind = if mode == CacheMode::Disabled {
            CacheBackendKind::None
        } else {
            kind
        };
        let backend = registry.backend(kind)?;

        let prefix = if !kind.uses_prefix() {
            String::new()
        } else if let Some(namespace) = registry.settings().namespace.as_deref() {
            format!("{key_prefix}-{namespace}-")
        } else {
            key_prefix.to_string()
        };

        Ok(Self {
            backend,
            kind,
            prefix,
            mode,
            dev_mode: registry.dev_mode(),
        })
    }

    /// The backend kind actually in use.
    #[must_use]
    pub const fn kind(&self) -> CacheBackendKind {
        self.kind
    }

    /// The key prefix applied to every key.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the full backend key for `key`.
    #[must_use]
    pub fn prefixed_key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    /// Reads a value. `None` is a miss (absent, expired, undecodable, or
    /// backend failure).
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if self.dev_mode && self.mode == CacheMode::WriteOnly {
            return None;
        }

        let start = Instant::now();
        let full_key = self.prefixed_key(key);
        let payload = match self.backend.get(&full_key) {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                record_operation_metrics("cache", self.backend.name(), "get", start, "miss");
                return None;
            },
            Err(e) => {
                self.report("get", &full_key, &e);
                record_operation_metrics("cache", self.backend.name(), "get", start, "error");
                return None;
            },
        };

        match serde_json::from_slice(&payload) {
            Ok(value) => {
                record_operation_metrics("cache", self.backend.name(), "get", start, "hit");
                Some(value)
            },
            Err(e) => {
                tracing::warn!(
                    backend = self.backend.name(),
                    key = %full_key,
                    error = %e,
                    "undecodable cache payload, treating as miss"
                );
                record_operation_metrics("cache", self.backend.name(), "get", start, "error");
                None
            },
        }
    }

    /// Stores a value for `ttl` seconds (0 means one day). With `fudge`, the
    /// TTL is scaled by a random factor in `[0.95, 1.05]`.
    ///
    /// Returns whether the backend accepted the write.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: u64, fudge: bool) -> bool {
        if key.is_empty() {
            tracing::warn!(backend = self.backend.name(), "cache set called with an empty key");
        }
        if self.dev_mode && self.mode == CacheMode::ReadOnly {
            return false;
        }

        let start = Instant::now();
        let full_key = self.prefixed_key(key);
        let payload = match serde_json::to_vec(value) {
            Ok(payload) => payload,
            Err(e) => {
                let err = Error::InvalidInput(format!("value cannot be serialized: {e}"));
                self.report("set", &full_key, &err);
                return false;
            },
        };

        let ttl = effective_ttl(ttl);
        let ttl = if fudge { fudge_ttl(ttl) } else { ttl };

        match self.backend.set(&full_key, &payload, ttl) {
            Ok(stored) => {
                let status = if stored { "success" } else { "refused" };
                record_operation_metrics("cache", self.backend.name(), "set", start, status);
                stored
            },
            Err(e) => {
                self.report("set", &full_key, &e);
                record_operation_metrics("cache", self.backend.name(), "set", start, "error");
                false
            },
        }
    }

    /// Removes a key. Returns whether the backend reported success.
    pub fn delete(&self, key: &str) -> bool {
        let start = Instant::now();
        let full_key = self.prefixed_key(key);
        match self.backend.delete(&full_key) {
            Ok(deleted) => {
                record_operation_metrics("cache", self.backend.name(), "delete", start, "success");
                deleted
            },
            Err(e) => {
                self.report("delete", &full_key, &e);
                record_operation_metrics("cache", self.backend.name(), "delete", start, "error");
                false
            },
        }
    }

    fn report(&self, operation: &str, key: &str, error: &Error) {
        tracing::warn!(
            backend = self.backend.name(),
            operation,
            key,
            error = %error,
            "cache operation failed"
        );
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("kind", &self.kind)
            .field("backend", &self.backend.name())
            .field("prefix", &self.prefix)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheSettings;
    use test_case::test_case;

    fn registry(namespace: Option<&str>, dev_mode: bool) -> CacheRegistry {
        let settings = CacheSettings {
            namespace: namespace.map(str::to_string),
            ..CacheSettings::default()
        };
        CacheRegistry::new(settings, dev_mode)
    }

    #[test]
    fn test_falsy_values_are_not_misses() {
        let registry = registry(None, false);
        let cache = Cache::new(&registry, CacheBackendKind::Variable, "t").unwrap();

        assert!(cache.set("false", &false, 60, false));
        assert!(cache.set("zero", &0, 60, false));
        assert!(cache.set("empty", "", 60, false));
        assert!(cache.set("empty_list", &Vec::<i32>::new(), 60, false));

        assert_eq!(cache.get::<bool>("false"), Some(false));
        assert_eq!(cache.get::<i64>("zero"), Some(0));
        assert_eq!(cache.get::<String>("empty"), Some(String::new()));
        assert_eq!(cache.get::<Vec<i32>>("empty_list"), Some(vec![]));
        assert_eq!(cache.get::<bool>("missing"), None);
    }

    #[test]
    fn test_prefix_includes_namespace() {
        let registry = registry(Some("site"), false);
        let cache = Cache::new(&registry, CacheBackendKind::Variable, "users").unwrap();
        assert_eq!(cache.prefixed_key("42"), "users-site-42");

        let plain = registry_without_namespace_prefix();
        assert_eq!(plain.prefixed_key("42"), "users42");
    }

    fn registry_without_namespace_prefix() -> Cache {
        let registry = registry(None, false);
        Cache::new(&registry, CacheBackendKind::Variable, "users").unwrap()
    }

    #[test]
    fn test_object_keys_are_never_prefixed() {
        let dir = tempfile::TempDir::new().unwrap();
        let settings = CacheSettings {
            namespace: Some("site".to_string()),
            object_store_root: Some(dir.path().to_path_buf()),
            ..CacheSettings::default()
        };
        let registry = CacheRegistry::new(settings, false);
        let cache = Cache::new(&registry, CacheBackendKind::Object, "pages").unwrap();
        assert_eq!(cache.prefixed_key("s3://b/x"), "s3://b/x");
        assert!(cache.set("s3://b/x", &vec!["a", "b"], 60, true));
        assert_eq!(
            cache.get::<Vec<String>>("s3://b/x"),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_prefixes_isolate_facades() {
        let registry = registry(None, false);
        let a = Cache::new(&registry, CacheBackendKind::Variable, "a").unwrap();
        let b = Cache::new(&registry, CacheBackendKind::Variable, "b").unwrap();
        a.set("k", &1, 60, false);
        assert_eq!(b.get::<i32>("k"), None);
        assert_eq!(a.get::<i32>("k"), Some(1));
    }

    #[test]
    fn test_disabled_mode_uses_none_backend() {
        let registry = registry(None, false);
        let cache = Cache::with_mode(
            &registry,
            CacheBackendKind::Variable,
            "t",
            CacheMode::Disabled,
        )
        .unwrap();
        assert_eq!(cache.kind(), CacheBackendKind::None);
        assert!(cache.set("k", &1, 60, false));
        assert_eq!(cache.get::<i32>("k"), None);
    }

    #[test_case(true, CacheMode::WriteOnly, None, true ; "write only in dev mode")]
    #[test_case(false, CacheMode::WriteOnly, Some(1), true ; "write only ignored outside dev")]
    #[test_case(true, CacheMode::ReadOnly, None, false ; "read only in dev mode")]
    #[test_case(false, CacheMode::ReadOnly, Some(1), true ; "read only ignored outside dev")]
    fn test_dev_only_modes(dev_mode: bool, mode: CacheMode, expected: Option<i32>, stored: bool) {
        let registry = registry(None, dev_mode);
        let cache = Cache::with_mode(&registry, CacheBackendKind::Variable, "m", mode).unwrap();
        assert_eq!(cache.set("k", &1, 60, false), stored);
        assert_eq!(cache.get::<i32>("k"), expected);
    }

    #[test]
    fn test_undecodable_payload_is_miss() {
        let registry = registry(None, false);
        let cache = Cache::new(&registry, CacheBackendKind::Variable, "t").unwrap();
        cache.set("k", "text", 60, false);
        assert_eq!(cache.get::<i64>("k"), None);
    }

    #[test]
    fn test_delete() {
        let registry = registry(None, false);
        let cache = Cache::new(&registry, CacheBackendKind::Local, "t").unwrap();
        cache.set("k", &"v", 60, false);
        assert!(cache.delete("k"));
        assert_eq!(cache.get::<String>("k"), None);
    }

    #[test_case(CacheBackendKind::Variable, u64::MAX, false ; "variable max ttl")]
    #[test_case(CacheBackendKind::Variable, u64::MAX, true ; "variable max ttl fudged")]
    #[test_case(CacheBackendKind::Local, u64::MAX / 2, true ; "local half max ttl fudged")]
    #[test_case(CacheBackendKind::Local, u64::MAX, false ; "local max ttl")]
    fn test_huge_ttl_is_stored(kind: CacheBackendKind, ttl: u64, fudge: bool) {
        let registry = registry(None, false);
        let cache = Cache::new(&registry, kind, "p").unwrap();
        assert!(cache.set("k", &1, ttl, fudge));
        assert_eq!(cache.get::<i32>("k"), Some(1));
    }

    #[test]
    fn test_effective_ttl() {
        assert_eq!(effective_ttl(0), DEFAULT_CACHE_TTL);
        assert_eq!(effective_ttl(30), 30);
    }

    #[test_case(100, FUDGE_MIN, 95 ; "lower bound")]
    #[test_case(100, FUDGE_MAX, 105 ; "upper bound")]
    #[test_case(100, 1.0, 100 ; "identity")]
    #[test_case(1, FUDGE_MAX, 1 ; "tiny ttl stays positive")]
    #[test_case(10, 2.0, 10 ; "factor is clamped")]
    fn test_fudge_ttl_with(ttl: u64, factor: f64, expected: u64) {
        assert_eq!(fudge_ttl_with(ttl, factor), expected);
    }

    #[test]
    fn test_fudge_ttl_stays_in_band() {
        for _ in 0..1000 {
            let fudged = fudge_ttl(3600);
            assert!((3420..=3780).contains(&fudged), "{fudged}");
        }
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!(CacheBackendKind::parse("REDIS"), Some(CacheBackendKind::Distributed));
        assert_eq!(CacheBackendKind::parse("table"), Some(CacheBackendKind::Table));
        assert_eq!(CacheBackendKind::parse("memcache"), None);
    }
}
