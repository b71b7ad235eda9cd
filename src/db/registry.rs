//! Connection registry: one [`Database`] per configured logical database.

use super::Database;
use crate::Result;
use crate::cache::CacheRegistry;
use crate::config::DataConfig;
use crate::sqlite::acquire_lock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Opens databases on first use and hands out shared handles.
///
/// Build one at process start and pass it to whatever needs a connection.
pub struct ConnectionRegistry {
    config: DataConfig,
    cache: Arc<CacheRegistry>,
    databases: Mutex<HashMap<String, Arc<Database>>>,
}

impl ConnectionRegistry {
    /// Creates a registry with its own [`CacheRegistry`].
    #[must_use]
    pub fn new(config: DataConfig) -> Self {
        let cache = Arc::new(CacheRegistry::from_config(&config));
        Self::with_cache(config, cache)
    }

    /// Creates a registry sharing an existing [`CacheRegistry`].
    #[must_use]
    pub fn with_cache(config: DataConfig, cache: Arc<CacheRegistry>) -> Self {
        Self {
            config,
            cache,
            databases: Mutex::new(HashMap::new()),
        }
    }

    /// The configuration this registry was built from.
    #[must_use]
    pub const fn config(&self) -> &DataConfig {
        &self.config
    }

    /// The cache registry handed to every database.
    #[must_use]
    pub const fn cache(&self) -> &Arc<CacheRegistry> {
        &self.cache
    }

    /// Returns the database called `name`, or the default database for `None`.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`](crate::Error::Configuration) if the name is
    ///   not configured (or no default exists)
    /// - [`Error::OperationFailed`](crate::Error::OperationFailed) if the
    ///   endpoints cannot be opened
    pub fn get(&self, name: Option<&str>) -> Result<Arc<Database>> {
        let (resolved, settings) = self.config.connection(name)?;

        let mut databases = acquire_lock(&self.databases);
        if let Some(db) = databases.get(resolved) {
            return Ok(Arc::clone(db));
        }

        let db = Arc::new(Database::open(
            resolved,
            settings,
            Arc::clone(&self.cache),
            self.config.dev_mode,
        )?);
        tracing::debug!(database = resolved, replica = db.has_replica(), "opened database");
        databases.insert(resolved.to_string(), Arc::clone(&db));
        Ok(db)
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("databases", &self.config.databases.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::config::{ConnectionSettings, EndpointConfig};
    use tempfile::TempDir;

    #[test]
    fn test_get_is_cached_per_name() {
        let dir = TempDir::new().unwrap();
        let config = DataConfig::default()
            .with_database(
                "app",
                ConnectionSettings::new(EndpointConfig::new(dir.path().join("app.db"))),
            )
            .with_default_database("app");
        let registry = ConnectionRegistry::new(config);

        let a = registry.get(None).unwrap();
        let b = registry.get(Some("app")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.name(), "app");
        assert!(!a.has_replica());
    }

    #[test]
    fn test_unknown_name_is_configuration_error() {
        let registry = ConnectionRegistry::new(DataConfig::default());
        assert!(matches!(registry.get(Some("nope")), Err(Error::Configuration(_))));
        assert!(matches!(registry.get(None), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_configured_replica_is_attached() {
        let dir = TempDir::new().unwrap();
        let replica = dir.path().join("replica.db");
        // The replica is opened read-only, so the file must exist.
        rusqlite::Connection::open(&replica).unwrap();

        let config = DataConfig::default().with_database(
            "app",
            ConnectionSettings::new(EndpointConfig::new(dir.path().join("app.db")))
                .with_read(EndpointConfig::new(&replica)),
        );
        let registry = ConnectionRegistry::new(config);
        let db = registry.get(Some("app")).unwrap();
        assert!(db.has_replica());
        assert!(matches!(
            db.init_read_only(&EndpointConfig::new(&replica)),
            Err(Error::ContractViolation(_))
        ));
    }
}
