//! Liveness handler.

/// Liveness probe handler.
///
/// Returns "OK" while the process is serving. Checks no dependencies: the
/// key set is loaded before the listener binds, and the buckets are only
/// touched by a trigger.
pub async fn health_check() -> &'static str {
    "OK"
}
