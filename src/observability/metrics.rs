//! Operation metrics.

use std::time::Instant;

/// Records `<component>_operations_total` and
/// `<component>_operation_duration_ms` for one operation.
///
/// # Arguments
///
/// * `component` - metric family, e.g. `cache`
/// * `backend` - backend name, e.g. `table`, `redis`
/// * `operation` - e.g. `get`, `set`, `delete`
/// * `start` - operation start from `Instant::now()`
/// * `status` - `hit`, `miss`, `success`, or `error`
pub fn record_operation_metrics(
    component: &'static str,
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    status: &'static str,
) {
    metrics::counter!(
        format!("{component}_operations_total"),
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        format!("{component}_operation_duration_ms"),
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_without_recorder_is_noop() {
        // No recorder installed; recording must not panic.
        record_operation_metrics("cache", "variable", "get", Instant::now(), "miss");
    }
}
