//! Per-process registry of cache backend instances.

use super::object::{FilesystemObjectStore, ObjectCacheBackend, ObjectStore};
use super::{
    CacheBackend, CacheBackendKind, LocalCacheBackend, NoneCacheBackend, RedisCacheBackend,
    TableCacheBackend, VariableCacheBackend,
};
use crate::config::{CacheSettings, DataConfig};
use crate::sqlite::acquire_lock;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Creates each backend kind at most once and hands out shared handles.
///
/// Construct one per process and pass it to every [`Cache`](super::Cache)
/// and [`ConnectionRegistry`](crate::db::ConnectionRegistry).
pub struct CacheRegistry {
    settings: CacheSettings,
    dev_mode: bool,
    object_store: Option<Arc<dyn ObjectStore>>,
    backends: Mutex<HashMap<CacheBackendKind, Arc<dyn CacheBackend>>>,
}

impl CacheRegistry {
    /// Creates a registry; backends are opened on first use.
    #[must_use]
    pub fn new(settings: CacheSettings, dev_mode: bool) -> Self {
        Self {
            settings,
            dev_mode,
            object_store: None,
            backends: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a registry from the cache section of a [`DataConfig`].
    #[must_use]
    pub fn from_config(config: &DataConfig) -> Self {
        Self::new(config.cache.clone(), config.dev_mode)
    }

    /// Uses `store` for the object backend instead of the filesystem store.
    #[must_use]
    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    /// Cache settings.
    #[must_use]
    pub const fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Whether development-only switches are honoured.
    #[must_use]
    pub const fn dev_mode(&self) -> bool {
        self.dev_mode
    }

    /// Returns the shared backend for `kind`, creating it on first use.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] if the kind needs settings that are absent
    ///   (Redis URL, object store root)
    /// - [`Error::FeatureNotEnabled`] for Redis without the `redis` feature
    /// - [`Error::OperationFailed`] if the backend cannot be opened
    pub fn backend(&self, kind: CacheBackendKind) -> Result<Arc<dyn CacheBackend>> {
        let mut backends = acquire_lock(&self.backends);
        if let Some(backend) = backends.get(&kind) {
            return Ok(Arc::clone(backend));
        }

        let backend = self.create(kind)?;
        tracing::debug!(backend = backend.name(), "created cache backend");
        backends.insert(kind, Arc::clone(&backend));
        Ok(backend)
    }

    fn create(&self, kind: CacheBackendKind) -> Result<Arc<dyn CacheBackend>> {
        let backend: Arc<dyn CacheBackend> = match kind {
            CacheBackendKind::None => Arc::new(NoneCacheBackend),
            CacheBackendKind::Variable => Arc::new(VariableCacheBackend::new()),
            CacheBackendKind::Local => {
                Arc::new(LocalCacheBackend::new(self.settings.local_capacity))
            },
            CacheBackendKind::Distributed => {
                let url = self.settings.redis_url.as_deref().ok_or_else(|| {
                    Error::Configuration(
                        "distributed cache selected but no redis_url is configured".to_string(),
                    )
                })?;
                Arc::new(RedisCacheBackend::new(url)?)
            },
            CacheBackendKind::Table => Arc::new(TableCacheBackend::open(
                self.settings.table_store_path.as_deref(),
                self.settings.chunk_len,
                self.settings.sweep_probability,
            )?),
            CacheBackendKind::Object => {
                let store = match &self.object_store {
                    Some(store) => Arc::clone(store),
                    None => {
                        let root = self.settings.object_store_root.as_ref().ok_or_else(|| {
                            Error::Configuration(
                                "object cache selected but no object_store_root is configured"
                                    .to_string(),
                            )
                        })?;
                        Arc::new(FilesystemObjectStore::new(root)?) as Arc<dyn ObjectStore>
                    },
                };
                Arc::new(ObjectCacheBackend::new(store))
            },
        };
        Ok(backend)
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("settings", &self.settings)
            .field("dev_mode", &self.dev_mode)
            .field("open_backends", &acquire_lock(&self.backends).len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_backend_is_shared_per_kind() {
        let registry = CacheRegistry::new(CacheSettings::default(), false);
        let a = registry.backend(CacheBackendKind::Variable).unwrap();
        let b = registry.backend(CacheBackendKind::Variable).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        a.set("k", b"1", 60).unwrap();
        assert_eq!(b.get("k").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_distributed_without_url_is_configuration_error() {
        let registry = CacheRegistry::new(CacheSettings::default(), false);
        assert!(matches!(
            registry.backend(CacheBackendKind::Distributed),
            Err(Error::Configuration(_))
        ));
    }

    #[cfg(not(feature = "redis"))]
    #[test]
    fn test_distributed_without_feature() {
        let settings = CacheSettings {
            redis_url: Some("redis://localhost:6379".to_string()),
            ..CacheSettings::default()
        };
        let registry = CacheRegistry::new(settings, false);
        assert!(matches!(
            registry.backend(CacheBackendKind::Distributed),
            Err(Error::FeatureNotEnabled(_))
        ));
    }

    #[test]
    fn test_object_backend_needs_root() {
        let registry = CacheRegistry::new(CacheSettings::default(), false);
        assert!(matches!(
            registry.backend(CacheBackendKind::Object),
            Err(Error::Configuration(_))
        ));

        let dir = TempDir::new().unwrap();
        let settings = CacheSettings {
            object_store_root: Some(dir.path().to_path_buf()),
            ..CacheSettings::default()
        };
        let registry = CacheRegistry::new(settings, false);
        assert_eq!(
            registry.backend(CacheBackendKind::Object).unwrap().name(),
            "object"
        );
    }

    #[test]
    fn test_table_backend_defaults_to_memory() {
        let registry = CacheRegistry::new(CacheSettings::default(), false);
        let table = registry.backend(CacheBackendKind::Table).unwrap();
        assert!(table.set("k", b"v", 60).unwrap());
        assert_eq!(table.get("k").unwrap(), Some(b"v".to_vec()));
    }
}
