//! Connection opening and locking for `SQLite` endpoints.

use crate::config::EndpointConfig;
use crate::sql::quote_identifier;
use crate::{Error, Result};
use rusqlite::{Connection, OpenFlags};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Acquires a mutex, recovering from poison.
///
/// A panic inside a previous critical section poisons the mutex; the guarded
/// value is still usable, so the poison is logged and the guard returned.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("mutex was poisoned, recovering");
            metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Applies WAL journaling, NORMAL synchronous and the busy timeout.
///
/// Journal mode cannot be changed on read-only or in-memory handles; pragma
/// failures are ignored there.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the busy timeout cannot be set.
pub fn configure_connection(conn: &Connection, busy_timeout_ms: u64) -> Result<()> {
    // journal_mode returns a row, which execute_batch would reject
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    conn.busy_timeout(Duration::from_millis(busy_timeout_ms))
        .map_err(|e| Error::OperationFailed {
            operation: "configure_connection".to_string(),
            cause: e.to_string(),
        })
}

/// Opens an endpoint and attaches its extra schemas.
///
/// A `read_only` handle is opened with `SQLITE_OPEN_READ_ONLY`, so writes
/// through it fail at the engine rather than reaching the file.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the file cannot be opened or an
/// attachment fails.
pub fn open_endpoint(endpoint: &EndpointConfig, read_only: bool) -> Result<Connection> {
    let conn = if endpoint.is_in_memory() {
        Connection::open_in_memory()
    } else if read_only {
        Connection::open_with_flags(
            &endpoint.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
                | OpenFlags::SQLITE_OPEN_URI,
        )
    } else {
        Connection::open(&endpoint.path)
    }
    .map_err(|e| Error::OperationFailed {
        operation: "open_connection".to_string(),
        cause: format!("{}: {e}", endpoint.path.display()),
    })?;

    configure_connection(&conn, endpoint.busy_timeout_ms)?;

    for (schema, path) in &endpoint.attach {
        let sql = format!("ATTACH DATABASE ?1 AS {}", quote_identifier(schema));
        conn.execute(&sql, [path.to_string_lossy()])
            .map_err(|e| Error::OperationFailed {
                operation: "attach_database".to_string(),
                cause: format!("{schema} ({}): {e}", path.display()),
            })?;
    }

    tracing::debug!(
        path = %endpoint.path.display(),
        read_only,
        attached = endpoint.attach.len(),
        "opened sqlite endpoint"
    );
    Ok(conn)
}
