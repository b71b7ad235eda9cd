//! # Argos Data
//!
//! The data-access layer of the Argos framework.
//!
//! Every other part of the framework reads, caches, and mutates persisted rows
//! through three collaborating pieces:
//!
//! - **Cache facade** ([`cache`]): uniform get/set/delete over a closed set of
//!   backends (per-process map, LRU accelerator, Redis, chunked `SQLite` table,
//!   object store, no-op). A miss is `None`, never confused with a stored
//!   falsy value.
//! - **Database router** ([`db`]): one write connection and an optional
//!   read-only replica per logical database, with "sticky master" read routing
//!   and query-result caching.
//! - **Record engine** ([`record`]): active-record rows that track original vs.
//!   current values and write only what changed.
//!
//! SQL fragments (comparisons, expressions, literal escaping) live in [`sql`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use argos_data::config::DataConfig;
//! use argos_data::db::ConnectionRegistry;
//! use argos_data::record::{Record, Table};
//!
//! struct Widgets;
//! impl Table for Widgets {
//!     const DATABASE: Option<&'static str> = Some("main");
//! }
//!
//! let registry = ConnectionRegistry::new(DataConfig::load_default());
//! let db = registry.get(None)?;
//!
//! let mut widget = Record::<Widgets>::load(&db, 7)?;
//! widget.set("name", "sprocket")?;
//! let id = widget.save(false)?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod cache;
pub mod config;
pub mod db;
pub mod observability;
pub mod record;
pub mod sql;
pub mod sqlite;

pub use cache::{Cache, CacheBackendKind, CacheMode, CacheRegistry};
pub use config::DataConfig;
pub use db::{ConnectionMode, ConnectionRegistry, Database, QueryResult, Row};
pub use record::{Criteria, FieldPermission, LoadOptions, Record, RecordSet, Table};
pub use sql::{Comparison, Expression, FieldValue, Value};

/// Error type for data-access operations.
///
/// Transient backend failures (a cache write that fails, a query that errors)
/// are *not* reported through this type: they are logged and mapped to a miss,
/// `false`, or a failed [`QueryResult`]. This type carries the conditions the
/// caller cannot recover from locally.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed identifiers, unparseable config values |
/// | `OperationFailed` | A backend cannot be opened or initialized |
/// | `Configuration` | Missing connection config, unusable cache backend kind |
/// | `ContractViolation` | Writing a read-only column, re-initializing the replica, bind count mismatch |
/// | `FeatureNotEnabled` | Selecting a backend whose cargo feature is off |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - A `SQLite` file cannot be opened or its schema created
    /// - The object-store root directory cannot be created
    /// - The logging subscriber is installed twice
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The process is configured against an undefined backend.
    ///
    /// The process should not continue: there is nothing sensible to read from
    /// or write to.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Calling code broke a contract of this layer.
    ///
    /// Raised when:
    /// - A no-access column is read or written, or a read-only column is written
    /// - The read-only connection is initialized twice
    /// - A prepared statement is executed with the wrong number of binds
    /// - A record is saved before its table identity is established
    /// - More than one unsaved row is adopted into a record set
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// Feature not enabled (requires feature flag).
    #[error("feature not enabled: {0} (compile with --features {0})")]
    FeatureNotEnabled(String),
}

/// Result type alias for data-access operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
///
/// # Examples
///
/// ```rust
/// use argos_data::current_timestamp;
///
/// let ts = current_timestamp();
/// assert!(ts > 0);
/// ```
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::OperationFailed {
            operation: "open_sqlite".to_string(),
            cause: "failed".to_string(),
        };
        assert_eq!(err.to_string(), "operation 'open_sqlite' failed: failed");

        let err = Error::ContractViolation("column `secret` is not publicly accessible".to_string());
        assert_eq!(
            err.to_string(),
            "contract violation: column `secret` is not publicly accessible"
        );

        let err = Error::FeatureNotEnabled("redis".to_string());
        assert_eq!(
            err.to_string(),
            "feature not enabled: redis (compile with --features redis)"
        );
    }
}
