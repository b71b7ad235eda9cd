//! Object-store cache backend.
//!
//! Keys name an object location directly: `s3://<bucket>/<path>`. They are
//! never namespaced by the facade. Stored objects are wrapped in an
//! [`Envelope`] carrying the expiry; objects written by other tools (plain
//! bytes, no envelope) are adopted on first read by wrapping them as a JSON
//! string and writing them back enveloped.
//!
//! Expiry is day-granular, matching bucket lifecycle rules.

use super::CacheBackend;
use crate::config::DEFAULT_CACHE_TTL;
use crate::{Error, Result, current_timestamp};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Key scheme for object-store keys.
pub const OBJECT_KEY_SCHEME: &str = "s3://";

const SECONDS_PER_DAY: u64 = 60 * 60 * 24;

/// Minimal bucket/key object store.
pub trait ObjectStore: Send + Sync {
    /// Reads an object. `Ok(None)` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, bucket: &str, path: &str) -> Result<Option<Vec<u8>>>;

    /// Writes an object, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be written.
    fn put(&self, bucket: &str, path: &str, body: &[u8]) -> Result<()>;

    /// Lists keys starting with `prefix`. Folder entries end with `/`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket cannot be listed.
    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;

    /// Deletes an object. Deleting a missing object succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the object exists but cannot be removed.
    fn delete(&self, bucket: &str, path: &str) -> Result<()>;
}

/// Object store on the local filesystem: one directory per bucket.
pub struct FilesystemObjectStore {
    root: PathBuf,
}

impl FilesystemObjectStore {
    /// Opens a store rooted at `root`, creating the directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| Error::OperationFailed {
            operation: "create_object_store_root".to_string(),
            cause: format!("{}: {e}", root.display()),
        })?;
        Ok(Self { root })
    }

    /// Resolves `bucket/path` below the root, rejecting traversal.
    fn resolve(&self, bucket: &str, path: &str) -> Result<PathBuf> {
        let relative = Path::new(bucket).join(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if bucket.is_empty() || escapes {
            return Err(Error::InvalidInput(format!(
                "invalid object location: {bucket}/{path}"
            )));
        }
        Ok(self.root.join(relative))
    }

    fn collect_keys(dir: &Path, base: &Path, keys: &mut Vec<String>) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io_error("list_objects", dir, &e)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| io_error("list_objects", dir, &e))?;
            let path = entry.path();
            let Ok(relative) = path.strip_prefix(base) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if path.is_dir() {
                keys.push(format!("{key}/"));
                Self::collect_keys(&path, base, keys)?;
            } else {
                keys.push(key);
            }
        }
        Ok(())
    }
}

fn io_error(operation: &str, path: &Path, e: &std::io::Error) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: format!("{}: {e}", path.display()),
    }
}

impl ObjectStore for FilesystemObjectStore {
    fn get(&self, bucket: &str, path: &str) -> Result<Option<Vec<u8>>> {
        let file = self.resolve(bucket, path)?;
        if file.is_dir() {
            return Ok(None);
        }
        match fs::read(&file) {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error("get_object", &file, &e)),
        }
    }

    fn put(&self, bucket: &str, path: &str, body: &[u8]) -> Result<()> {
        let file = self.resolve(bucket, path)?;
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error("put_object", parent, &e))?;
        }
        fs::write(&file, body).map_err(|e| io_error("put_object", &file, &e))
    }

    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let base = self.resolve(bucket, "")?;
        let mut keys = Vec::new();
        Self::collect_keys(&base, &base, &mut keys)?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    fn delete(&self, bucket: &str, path: &str) -> Result<()> {
        let file = self.resolve(bucket, path)?;
        match fs::remove_file(&file) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("delete_object", &file, &e)),
        }
    }
}

/// Stored form of a cached object.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    /// Unix seconds after which the object is stale.
    expires_at: u64,
    /// The facade's encoded value.
    payload: String,
}

/// Parses `s3://bucket/path` into `(bucket, path)`.
#[must_use]
pub fn parse_object_key(key: &str) -> Option<(&str, &str)> {
    let rest = key.strip_prefix(OBJECT_KEY_SCHEME)?;
    let (bucket, path) = rest.split_once('/')?;
    if bucket.is_empty() {
        return None;
    }
    Some((bucket, path))
}

/// Rounds a TTL in seconds up to whole days (at least one).
#[must_use]
pub const fn round_ttl_to_days(ttl: u64) -> u64 {
    let days = ttl.div_ceil(SECONDS_PER_DAY);
    if days == 0 {
        SECONDS_PER_DAY
    } else {
        days * SECONDS_PER_DAY
    }
}

/// Cache backend over an [`ObjectStore`].
pub struct ObjectCacheBackend {
    store: Arc<dyn ObjectStore>,
}

impl ObjectCacheBackend {
    /// Wraps a store.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    fn location(key: &str) -> Option<(&str, &str)> {
        let location = parse_object_key(key).filter(|(_, path)| !path.is_empty());
        if location.is_none() {
            tracing::warn!(key, "object cache key must be of the form s3://<bucket>/<path>");
        }
        location
    }

    fn write_envelope(&self, bucket: &str, path: &str, payload: String, ttl: u64) -> Result<()> {
        let envelope = Envelope {
            expires_at: current_timestamp().saturating_add(round_ttl_to_days(ttl)),
            payload,
        };
        let body = serde_json::to_vec(&envelope).map_err(|e| Error::OperationFailed {
            operation: "encode_object_envelope".to_string(),
            cause: e.to_string(),
        })?;
        self.store.put(bucket, path, &body)
    }
}

impl CacheBackend for ObjectCacheBackend {
    fn name(&self) -> &'static str {
        "object"
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let Some((bucket, path)) = Self::location(key) else {
            return Ok(None);
        };
        let Some(body) = self.store.get(bucket, path)? else {
            return Ok(None);
        };

        if let Ok(envelope) = serde_json::from_slice::<Envelope>(&body) {
            if envelope.expires_at <= current_timestamp() {
                return Ok(None);
            }
            return Ok(Some(envelope.payload.into_bytes()));
        }

        // Not written by this backend: adopt it as an opaque string value.
        let raw = String::from_utf8_lossy(&body).into_owned();
        let payload = serde_json::to_string(&raw).map_err(|e| Error::OperationFailed {
            operation: "encode_raw_object".to_string(),
            cause: e.to_string(),
        })?;
        if let Err(e) = self.write_envelope(bucket, path, payload.clone(), DEFAULT_CACHE_TTL) {
            tracing::warn!(key, error = %e, "failed to re-store raw object in envelope");
        }
        Ok(Some(payload.into_bytes()))
    }

    fn set(&self, key: &str, payload: &[u8], ttl: u64) -> Result<bool> {
        let Some((bucket, path)) = Self::location(key) else {
            return Ok(false);
        };
        let payload = String::from_utf8(payload.to_vec())
            .map_err(|e| Error::InvalidInput(format!("object cache payload is not UTF-8: {e}")))?;
        self.write_envelope(bucket, path, payload, ttl)?;
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let Some((bucket, path)) = Self::location(key) else {
            return Ok(false);
        };

        let mut deleted = false;
        let mut failed = false;
        for object in self.store.list(bucket, path)? {
            if object.ends_with('/') {
                continue;
            }
            match self.store.delete(bucket, &object) {
                Ok(()) => deleted = true,
                Err(e) => {
                    tracing::warn!(bucket, object, error = %e, "failed to delete cached object");
                    failed = true;
                },
            }
        }
        Ok(deleted && !failed)
    }
}
