//! Database router.
//!
//! A [`Database`] owns one write connection and, optionally, one read-only
//! replica connection for a logical database. [`Database::query`] always
//! uses the write connection; [`Database::read`] uses whichever the current
//! select mode names.
//!
//! # Sticky master reads
//!
//! Reads go to the replica by default. A caller that just wrote and must
//! read its own write back calls [`Database::set_select_mode_master`]:
//!
//! - `set_select_mode_master(true)` switches the *next* read to the write
//!   connection; the read after that returns to the replica.
//! - `set_select_mode_master(false)` also increments a tally; reads stay on
//!   the write connection until [`Database::set_select_mode_replica`]
//!   brings the tally back to zero.
//!
//! The tally is best-effort: unmatched master/replica calls are not detected.
//!
//! # Result caching
//!
//! The `select_*` helpers take an optional [`CacheBackendKind`] and TTL. On a
//! hit the database is not touched; on a miss the normalized result is
//! cached under `<method>::<sha256(sql)>`.

mod registry;
mod result;
mod statement;

pub use registry::ConnectionRegistry;
pub use result::{QueryResult, Row};
pub use statement::PreparedStatement;

use crate::cache::{Cache, CacheBackendKind, CacheRegistry};
use crate::config::{ConnectionSettings, EndpointConfig};
use crate::sql::{Value, collapse_whitespace};
use crate::sqlite::{acquire_lock, open_endpoint};
use crate::{Error, Result};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::panic::Location;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

/// Which connection a statement runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionMode {
    /// The write (master) connection.
    Master,
    /// The read-only replica connection.
    Replica,
}

impl ConnectionMode {
    /// Returns the mode as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Replica => "replica",
        }
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-database routing state.
#[derive(Debug)]
struct RouterState {
    select_mode: ConnectionMode,
    master_tally: u32,
    num_rows: usize,
    last_error: Option<String>,
    last_mode: ConnectionMode,
    autocommit: bool,
}

impl Default for RouterState {
    fn default() -> Self {
        Self {
            select_mode: ConnectionMode::Replica,
            master_tally: 0,
            num_rows: 0,
            last_error: None,
            last_mode: ConnectionMode::Master,
            autocommit: true,
        }
    }
}

/// Cached `select_*` payload.
#[derive(Serialize, Deserialize)]
struct CachedSelect<T> {
    d: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sql: Option<String>,
}

/// A logical database: a write connection plus an optional replica.
pub struct Database {
    name: String,
    write: Arc<Mutex<Connection>>,
    read: OnceLock<Mutex<Connection>>,
    state: Mutex<RouterState>,
    cache: Arc<CacheRegistry>,
    dev_mode: bool,
}

impl Database {
    /// Wraps an open write connection.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        write: Connection,
        cache: Arc<CacheRegistry>,
        dev_mode: bool,
    ) -> Self {
        Self {
            name: name.into(),
            write: Arc::new(Mutex::new(write)),
            read: OnceLock::new(),
            state: Mutex::new(RouterState::default()),
            cache,
            dev_mode,
        }
    }

    /// Opens the configured endpoints for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if an endpoint cannot be opened.
    pub fn open(
        name: impl Into<String>,
        settings: &ConnectionSettings,
        cache: Arc<CacheRegistry>,
        dev_mode: bool,
    ) -> Result<Self> {
        let write = open_endpoint(&settings.write, false)?;
        let db = Self::new(name, write, cache, dev_mode);
        if let Some(read) = &settings.read {
            db.init_read_only(read)?;
        }
        Ok(db)
    }

    /// Opens a private in-memory database with no replica.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if `SQLite` cannot allocate it.
    pub fn open_in_memory(name: impl Into<String>, cache: Arc<CacheRegistry>) -> Result<Self> {
        let write = open_endpoint(&EndpointConfig::in_memory(), false)?;
        let dev_mode = cache.dev_mode();
        Ok(Self::new(name, write, cache, dev_mode))
    }

    /// Logical database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether development-only behavior is enabled.
    #[must_use]
    pub const fn dev_mode(&self) -> bool {
        self.dev_mode
    }

    /// Attaches the dedicated read-only connection.
    ///
    /// # Errors
    ///
    /// - [`Error::ContractViolation`] if a read connection is already set
    /// - [`Error::OperationFailed`] if the endpoint cannot be opened
    pub fn init_read_only(&self, endpoint: &EndpointConfig) -> Result<()> {
        if self.read.get().is_some() {
            return Err(self.read_already_set());
        }
        let conn = open_endpoint(endpoint, true)?;
        self.read
            .set(Mutex::new(conn))
            .map_err(|_| self.read_already_set())?;
        tracing::debug!(database = %self.name, "read-only connection attached");
        Ok(())
    }

    fn read_already_set(&self) -> Error {
        Error::ContractViolation(format!(
            "read-only connection for '{}' is already initialized",
            self.name
        ))
    }

    /// Returns true if a dedicated read connection is attached.
    #[must_use]
    pub fn has_replica(&self) -> bool {
        self.read.get().is_some()
    }

    /// Routes reads to the write connection.
    ///
    /// With `sticky_across_calls == true` only the next [`read`](Self::read)
    /// is affected. With `false` the master tally is incremented and reads
    /// stay on the write connection until a matching
    /// [`set_select_mode_replica`](Self::set_select_mode_replica).
    pub fn set_select_mode_master(&self, sticky_across_calls: bool) {
        let mut state = acquire_lock(&self.state);
        state.select_mode = ConnectionMode::Master;
        if !sticky_across_calls {
            state.master_tally = state.master_tally.saturating_add(1);
        }
    }

    /// Decrements the master tally (floored at 0) and routes the next read
    /// to the replica.
    pub fn set_select_mode_replica(&self) {
        let mut state = acquire_lock(&self.state);
        state.master_tally = state.master_tally.saturating_sub(1);
        state.select_mode = ConnectionMode::Replica;
    }

    /// Connection the next read will use.
    #[must_use]
    pub fn select_mode(&self) -> ConnectionMode {
        acquire_lock(&self.state).select_mode
    }

    /// Current master tally.
    #[must_use]
    pub fn master_tally(&self) -> u32 {
        acquire_lock(&self.state).master_tally
    }

    /// Connection used by the last statement. Without a replica every read
    /// reports [`ConnectionMode::Master`].
    #[must_use]
    pub fn last_mode(&self) -> ConnectionMode {
        acquire_lock(&self.state).last_mode
    }

    /// Runs a statement on the write connection.
    #[track_caller]
    pub fn query(&self, sql: &str) -> QueryResult {
        let caller = Location::caller();
        let result = run_sql(&acquire_lock(&self.write), sql);
        self.finish(sql, ConnectionMode::Master, result, caller)
    }

    /// Runs a statement on the connection named by the select mode.
    ///
    /// Afterwards the select mode falls back to the replica unless the master
    /// tally is positive.
    #[track_caller]
    pub fn read(&self, sql: &str) -> QueryResult {
        let caller = Location::caller();
        let mode = {
            let mut state = acquire_lock(&self.state);
            let mode = state.select_mode;
            if state.master_tally == 0 {
                state.select_mode = ConnectionMode::Replica;
            }
            mode
        };

        let (result, used) = match (mode, self.read.get()) {
            (ConnectionMode::Replica, Some(read)) => {
                (run_sql(&acquire_lock(read), sql), ConnectionMode::Replica)
            },
            _ => (run_sql(&acquire_lock(&self.write), sql), ConnectionMode::Master),
        };
        self.finish(sql, used, result, caller)
    }

    fn finish(
        &self,
        sql: &str,
        mode: ConnectionMode,
        (result, start): (QueryResult, Instant),
        caller: &'static Location<'static>,
    ) -> QueryResult {
        let status = if result.success { "success" } else { "error" };
        metrics::counter!("db_queries_total", "mode" => mode.as_str(), "status" => status)
            .increment(1);
        metrics::histogram!("db_query_duration_ms", "mode" => mode.as_str())
            .record(start.elapsed().as_secs_f64() * 1000.0);

        if let Some(error) = &result.error {
            tracing::warn!(
                database = %self.name,
                mode = %mode,
                sql = %collapse_whitespace(sql),
                caller = %caller,
                error = %error,
                "query failed"
            );
        }

        let mut state = acquire_lock(&self.state);
        state.num_rows = result.affected;
        state.last_error.clone_from(&result.error);
        state.last_mode = mode;
        result
    }

    /// Runs several `;`-separated statements on the write connection.
    #[track_caller]
    pub fn execute_batch(&self, sql: &str) -> bool {
        let caller = Location::caller();
        let start = Instant::now();
        let outcome = acquire_lock(&self.write).execute_batch(sql);
        let result = match outcome {
            Ok(()) => QueryResult::ok(Vec::new(), 0),
            Err(e) => QueryResult::failed(e.to_string()),
        };
        self.finish(sql, ConnectionMode::Master, (result, start), caller)
            .success
    }

    /// All rows, or an empty vector on failure.
    #[track_caller]
    pub fn select_all(
        &self,
        sql: &str,
        cache: Option<CacheBackendKind>,
        ttl: Option<u64>,
    ) -> Vec<Row> {
        self.cached_select("select_all", sql, cache, ttl, |r| r.rows)
    }

    /// The first row.
    #[track_caller]
    pub fn select_row(
        &self,
        sql: &str,
        cache: Option<CacheBackendKind>,
        ttl: Option<u64>,
    ) -> Option<Row> {
        self.cached_select("select_row", sql, cache, ttl, |r| {
            r.rows.into_iter().next()
        })
    }

    /// The first column of every row.
    #[track_caller]
    pub fn select_col(
        &self,
        sql: &str,
        cache: Option<CacheBackendKind>,
        ttl: Option<u64>,
    ) -> Vec<Value> {
        self.cached_select("select_col", sql, cache, ttl, |r| {
            r.rows
                .into_iter()
                .map(|row| row.get_index(0).cloned().unwrap_or(Value::Null))
                .collect()
        })
    }

    /// The first column of the first row. No row, `NULL`, and `''` are all
    /// `None`. Zero in any form (`0`, `0.0`, `'0'`) is a value and comes back
    /// as `Some`.
    #[track_caller]
    pub fn select_val(
        &self,
        sql: &str,
        cache: Option<CacheBackendKind>,
        ttl: Option<u64>,
    ) -> Option<Value> {
        self.cached_select("select_val", sql, cache, ttl, |r| {
            r.rows
                .into_iter()
                .next()
                .and_then(|row| row.get_index(0).cloned())
                .filter(|v| !v.is_null() && v.as_str() != Some(""))
        })
    }

    /// Number of rows the query returns; 0 on failure.
    #[track_caller]
    pub fn select_count(
        &self,
        sql: &str,
        cache: Option<CacheBackendKind>,
        ttl: Option<u64>,
    ) -> usize {
        self.cached_select("select_count", sql, cache, ttl, |r| r.rows.len())
    }

    #[track_caller]
    fn cached_select<T, F>(
        &self,
        method: &'static str,
        sql: &str,
        cache: Option<CacheBackendKind>,
        ttl: Option<u64>,
        normalize: F,
    ) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(QueryResult) -> T,
    {
        let prefix = format!("{}:", self.name);
        let facade = cache.and_then(|kind| match Cache::new(&self.cache, kind, &prefix) {
            Ok(facade) => Some(facade),
            Err(e) => {
                tracing::warn!(
                    database = %self.name,
                    backend = %kind,
                    error = %e,
                    "query cache unavailable, reading uncached"
                );
                None
            },
        });
        let key = select_cache_key(method, sql);

        if let Some(facade) = &facade
            && let Some(hit) = facade.get::<CachedSelect<T>>(&key)
        {
            return hit.d;
        }

        let result = self.read(sql);
        let success = result.success;
        let data = normalize(result);

        if success && let Some(facade) = &facade {
            let payload = CachedSelect {
                d: &data,
                sql: self.dev_mode.then(|| sql.to_string()),
            };
            facade.set(&key, &payload, ttl.unwrap_or(0), false);
        }
        data
    }

    /// Prepares a statement on the write connection. Invalid SQL is logged
    /// and yields `None`.
    #[track_caller]
    pub fn prepare(&self, sql: &str) -> Option<PreparedStatement> {
        let caller = Location::caller();
        let parameter_count = {
            let conn = acquire_lock(&self.write);
            let prepared = conn.prepare(sql).map(|stmt| stmt.parameter_count());
            match prepared {
                Ok(count) => count,
                Err(e) => {
                    tracing::warn!(
                        database = %self.name,
                        sql = %collapse_whitespace(sql),
                        caller = %caller,
                        error = %e,
                        "prepare failed"
                    );
                    return None;
                },
            }
        };
        Some(PreparedStatement::new(
            Arc::clone(&self.write),
            sql.to_string(),
            parameter_count,
        ))
    }

    /// Escapes a string for a single-quoted literal.
    #[must_use]
    pub fn escape_val(&self, input: &str) -> String {
        crate::sql::escape_val(input)
    }

    /// Row id of the last insert on the write connection.
    #[must_use]
    pub fn last_insert_id(&self) -> i64 {
        acquire_lock(&self.write).last_insert_rowid()
    }

    /// Rows changed (statements) or returned (queries) by the last call.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        acquire_lock(&self.state).num_rows
    }

    /// Error message of the last statement, if it failed.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        acquire_lock(&self.state).last_error.clone()
    }

    /// Whether statements commit individually.
    #[must_use]
    pub fn autocommit(&self) -> bool {
        acquire_lock(&self.state).autocommit
    }

    /// Turns autocommit off (opening a transaction) or on (committing any
    /// open transaction).
    #[track_caller]
    pub fn set_autocommit(&self, enabled: bool) -> bool {
        let was_enabled = {
            let mut state = acquire_lock(&self.state);
            std::mem::replace(&mut state.autocommit, enabled)
        };
        match (was_enabled, enabled) {
            (true, false) => self.query("BEGIN").success,
            (false, true) => self.end_transaction("COMMIT"),
            _ => true,
        }
    }

    /// Commits. While autocommit is off the next transaction opens at once.
    #[track_caller]
    pub fn commit(&self) -> bool {
        self.end_transaction("COMMIT") && self.reopen_transaction()
    }

    /// Rolls back. While autocommit is off the next transaction opens at once.
    #[track_caller]
    pub fn rollback(&self) -> bool {
        self.end_transaction("ROLLBACK") && self.reopen_transaction()
    }

    #[track_caller]
    fn end_transaction(&self, command: &str) -> bool {
        if acquire_lock(&self.write).is_autocommit() {
            // Nothing open.
            return true;
        }
        self.query(command).success
    }

    #[track_caller]
    fn reopen_transaction(&self) -> bool {
        if self.autocommit() {
            return true;
        }
        self.query("BEGIN").success
    }

    /// Probes liveness with `SELECT 1`.
    ///
    /// `None` probes both connections. Without a replica the write connection
    /// answers for [`ConnectionMode::Replica`].
    pub fn reset_connection(&self, mode: Option<ConnectionMode>) -> bool {
        let probe = |conn: &Mutex<Connection>| {
            acquire_lock(conn)
                .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .is_ok()
        };
        let probe_replica = || self.read.get().map_or_else(|| probe(&self.write), probe);

        let alive = match mode {
            Some(ConnectionMode::Master) => probe(&self.write),
            Some(ConnectionMode::Replica) => probe_replica(),
            None => probe(&self.write) && probe_replica(),
        };
        if !alive {
            tracing::warn!(database = %self.name, ?mode, "connection liveness probe failed");
        }
        alive
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("has_replica", &self.has_replica())
            .field("dev_mode", &self.dev_mode)
            .finish_non_exhaustive()
    }
}

/// `<method>::<hex sha256 of sql>`
#[must_use]
pub fn select_cache_key(method: &str, sql: &str) -> String {
    format!("{method}::{}", hex::encode(Sha256::digest(sql.as_bytes())))
}

/// Runs one statement, returning the result and its start time.
///
/// Statements that produce columns are read; others are executed.
fn run_sql(conn: &Connection, sql: &str) -> (QueryResult, Instant) {
    let start = Instant::now();
    let result = match collect_rows(conn, sql) {
        Ok((rows, affected)) => QueryResult {
            insert_id: conn.last_insert_rowid(),
            ..QueryResult::ok(rows, affected)
        },
        Err(e) => QueryResult::failed(e.to_string()),
    };
    (result, start)
}

fn collect_rows(conn: &Connection, sql: &str) -> rusqlite::Result<(Vec<Row>, usize)> {
    let mut stmt = conn.prepare(sql)?;
    if stmt.column_count() == 0 {
        let affected = stmt.execute([])?;
        return Ok((Vec::new(), affected));
    }

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();
    let rows = stmt
        .query_map([], |row| {
            (0..width)
                .map(|i| row.get_ref(i).map(Value::from))
                .collect::<rusqlite::Result<Vec<_>>>()
        })?
        .map(|values| values.map(|values| Row::new(columns.clone(), values)))
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let count = rows.len();
    Ok((rows, count))
}
