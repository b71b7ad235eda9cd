//! Configuration management.
//!
//! Configuration is assembled from defaults, an optional TOML file, and
//! `ARGOS_*` environment overrides, then handed explicitly to the
//! [`ConnectionRegistry`](crate::db::ConnectionRegistry) and
//! [`CacheRegistry`](crate::cache::CacheRegistry). Nothing in this crate reads
//! configuration from ambient global state after construction.
//!
//! ```toml
//! dev_mode = false
//! default_database = "app"
//!
//! [cache]
//! namespace = "site-a"
//! table_store_path = "/var/lib/argos/cache.db"
//!
//! [databases.app.write]
//! path = "/var/lib/argos/app.db"
//!
//! [databases.app.read]
//! path = "/var/lib/argos/app-replica.db"
//! ```

use crate::cache::CacheMode;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable toggling development mode.
pub const DEV_MODE_ENV: &str = "ARGOS_DEV_MODE";

/// Environment variable setting the site-level cache namespace.
pub const CACHE_NAMESPACE_ENV: &str = "ARGOS_CACHE_NAMESPACE";

/// Environment variable setting the Redis URL for the distributed cache.
pub const REDIS_URL_ENV: &str = "ARGOS_REDIS_URL";

/// Connection name that resolves to the configured default database.
pub const DEFAULT_CONNECTION: &str = "DEFAULT";

/// Default cache TTL in seconds (one day).
pub const DEFAULT_CACHE_TTL: u64 = 60 * 60 * 24;

/// Default capacity of the local accelerator cache.
pub const DEFAULT_LOCAL_CAPACITY: usize = 10_000;

/// Default chunk length for the table-backed cache.
pub const DEFAULT_CHUNK_LEN: usize = 65_000;

/// Default probability that a table-cache write sweeps expired rows.
pub const DEFAULT_SWEEP_PROBABILITY: f64 = 0.01;

/// Main configuration for the data-access layer.
#[derive(Debug, Clone, Default)]
pub struct DataConfig {
    /// Development mode: enables cache bypass modes and SQL capture in
    /// cached query results.
    pub dev_mode: bool,
    /// Connection name used when none is requested.
    pub default_database: Option<String>,
    /// Cache settings.
    pub cache: CacheSettings,
    /// Connection settings by logical database name.
    pub databases: BTreeMap<String, ConnectionSettings>,
}

/// Cache facade settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Site-level namespace appended to every key prefix (except object-store keys).
    pub namespace: Option<String>,
    /// Cache bypass mode.
    pub mode: CacheMode,
    /// Maximum entries held by the local accelerator.
    pub local_capacity: usize,
    /// Redis URL for the distributed backend.
    pub redis_url: Option<String>,
    /// `SQLite` file for the table-backed cache.
    pub table_store_path: Option<PathBuf>,
    /// Root directory of the object store.
    pub object_store_root: Option<PathBuf>,
    /// Probability (0.0 to 1.0) that a table-cache write sweeps expired rows.
    pub sweep_probability: f64,
    /// Characters per chunk in the table-backed cache.
    pub chunk_len: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            namespace: None,
            mode: CacheMode::Normal,
            local_capacity: DEFAULT_LOCAL_CAPACITY,
            redis_url: None,
            table_store_path: None,
            object_store_root: None,
            sweep_probability: DEFAULT_SWEEP_PROBABILITY,
            chunk_len: DEFAULT_CHUNK_LEN,
        }
    }
}

/// A logical database: one write endpoint and an optional read replica.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionSettings {
    /// Write (master) endpoint.
    pub write: EndpointConfig,
    /// Read-only replica endpoint. Reads use `write` when absent.
    #[serde(default)]
    pub read: Option<EndpointConfig>,
}

impl ConnectionSettings {
    /// Settings with a write endpoint only.
    #[must_use]
    pub const fn new(write: EndpointConfig) -> Self {
        Self { write, read: None }
    }

    /// Adds a read replica endpoint.
    #[must_use]
    pub fn with_read(mut self, read: EndpointConfig) -> Self {
        self.read = Some(read);
        self
    }
}

/// A `SQLite` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Database file (`:memory:` for an in-memory database).
    pub path: PathBuf,
    /// Additional schemas to attach, by schema name.
    #[serde(default)]
    pub attach: BTreeMap<String, PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

const fn default_busy_timeout_ms() -> u64 {
    5000
}

impl EndpointConfig {
    /// Endpoint for a database file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            attach: BTreeMap::new(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }

    /// In-memory endpoint.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(":memory:")
    }

    /// Attaches another database file under `schema`.
    #[must_use]
    pub fn with_attached(mut self, schema: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.attach.insert(schema.into(), path.into());
        self
    }

    /// Returns true for an in-memory endpoint.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == ":memory:"
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Development mode.
    pub dev_mode: Option<bool>,
    /// Default connection name.
    pub default_database: Option<String>,
    /// Cache section.
    pub cache: Option<CacheSettings>,
    /// Database sections.
    #[serde(default)]
    pub databases: BTreeMap<String, ConnectionSettings>,
}

impl DataConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: e.to_string(),
        })?;

        Self::from_toml_str(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the text is not valid configuration.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| Error::InvalidInput(e.to_string()))?;

        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location, then applies
    /// environment overrides.
    ///
    /// Checks `<platform config dir>/argos/config.toml`, then
    /// `~/.config/argos/config.toml`. Returns defaults if neither exists.
    #[must_use]
    pub fn load_default() -> Self {
        let mut config = Self::default_file_paths()
            .into_iter()
            .filter(|p| p.exists())
            .find_map(|p| match Self::load_from_file(&p) {
                Ok(config) => Some(config),
                Err(e) => {
                    tracing::warn!(path = %p.display(), error = %e, "Ignoring unreadable config file");
                    None
                },
            })
            .unwrap_or_default();

        config.apply_env_overrides();
        config
    }

    fn default_file_paths() -> Vec<PathBuf> {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Vec::new();
        };
        vec![
            base_dirs.config_dir().join("argos").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("argos")
                .join("config.toml"),
        ]
    }

    /// Applies `ARGOS_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var(DEV_MODE_ENV) {
            self.dev_mode = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Ok(ns) = std::env::var(CACHE_NAMESPACE_ENV) {
            self.cache.namespace = Some(ns).filter(|s| !s.is_empty());
        }
        if let Ok(url) = std::env::var(REDIS_URL_ENV) {
            self.cache.redis_url = Some(url).filter(|s| !s.is_empty());
        }
    }

    /// Converts a `ConfigFile` to `DataConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(dev_mode) = file.dev_mode {
            config.dev_mode = dev_mode;
        }
        config.default_database = file.default_database;
        if let Some(mut cache) = file.cache {
            cache.sweep_probability = cache.sweep_probability.clamp(0.0, 1.0);
            if cache.chunk_len == 0 {
                cache.chunk_len = DEFAULT_CHUNK_LEN;
            }
            config.cache = cache;
        }
        config.databases = file.databases;

        config
    }

    /// Sets development mode.
    #[must_use]
    pub const fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    /// Adds (or replaces) a logical database.
    #[must_use]
    pub fn with_database(mut self, name: impl Into<String>, settings: ConnectionSettings) -> Self {
        self.databases.insert(name.into(), settings);
        self
    }

    /// Sets the default connection name.
    #[must_use]
    pub fn with_default_database(mut self, name: impl Into<String>) -> Self {
        self.default_database = Some(name.into());
        self
    }

    /// Replaces the cache settings.
    #[must_use]
    pub fn with_cache(mut self, cache: CacheSettings) -> Self {
        self.cache = cache;
        self
    }

    /// Looks up the settings for a connection name.
    ///
    /// `None` and [`DEFAULT_CONNECTION`] resolve to the default database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the connection is not configured.
    pub fn connection(&self, name: Option<&str>) -> Result<(&str, &ConnectionSettings)> {
        let name = match name {
            Some(name) if name != DEFAULT_CONNECTION => name,
            _ => self.default_database.as_deref().ok_or_else(|| {
                Error::Configuration(
                    "No default DB connection defined and none specified".to_string(),
                )
            })?,
        };
        self.databases
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| Error::Configuration(format!("Could not find configuration for db '{name}'")))
    }
}
