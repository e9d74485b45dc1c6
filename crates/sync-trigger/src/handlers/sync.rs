//! Sync trigger handler.
//!
//! Builds the source and destination backends from the fixed configuration
//! and asks the engine for a one-directional sync with deletion disabled.
//! There is no retry at this layer; the scheduler calls again on its next
//! tick.

use crate::auth::IdentityDocument;
use crate::errors::TriggerError;
use crate::observability::metrics::{record_sync_bytes, record_sync_objects, record_sync_run};
use crate::routes::AppState;
use crate::storage::{Backend, Role, SyncError, SyncOptions};
use axum::extract::State;
use axum::Extension;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Response body on success.
pub const SYNC_OK_BODY: &str = "ok";

/// Times one engine run and records exactly one outcome for it.
///
/// The handler future is dropped when the client disconnects or the request
/// times out, so a run that never reaches [`RunTimer::finish`] is recorded
/// as cancelled on drop.
struct RunTimer {
    start: Instant,
    finished: bool,
}

impl RunTimer {
    fn start() -> Self {
        Self {
            start: Instant::now(),
            finished: false,
        }
    }

    fn finish(mut self, status: &'static str) -> Duration {
        self.finished = true;
        let duration = self.start.elapsed();
        record_sync_run(status, duration);
        duration
    }
}

impl Drop for RunTimer {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let duration = self.start.elapsed();
        record_sync_run("cancelled", duration);
        tracing::warn!(
            target: "sync.handlers.sync",
            duration_ms = duration.as_millis() as u64,
            "Sync abandoned before completion"
        );
    }
}

/// Handler for `GET /`.
///
/// # Response
///
/// - 200 `ok` when the sync completed
/// - 500 when either backend cannot be built (the engine is not called) or
///   the sync fails
///
/// Dropping the request (client disconnect, request timeout) cancels the
/// running sync.
#[instrument(skip_all, name = "sync.handlers.sync")]
pub async fn trigger_sync(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<IdentityDocument>,
) -> Result<&'static str, TriggerError> {
    let cancellation = CancellationToken::new();
    let _cancel_on_drop = cancellation.clone().drop_guard();

    let source = Backend::open(Role::Source, &state.config.sync.source)?;
    let destination = Backend::open(Role::Destination, &state.config.sync.destination)?;

    let _permit = state.guard.acquire().await;

    tracing::info!(
        target: "sync.handlers.sync",
        email = %identity.principal(),
        source = %source.storage_url(),
        destination = %destination.storage_url(),
        "Starting sync"
    );

    let timer = RunTimer::start();
    let result = state
        .engine
        .sync(
            &source,
            &destination,
            SyncOptions { delete: false },
            cancellation.clone(),
        )
        .await;

    match result {
        Ok(report) => {
            let duration = timer.finish("success");
            record_sync_objects(report.transferred, report.skipped, report.deleted);
            record_sync_bytes(report.bytes);

            tracing::info!(
                target: "sync.handlers.sync",
                email = %identity.principal(),
                transferred = report.transferred,
                skipped = report.skipped,
                bytes = report.bytes,
                warnings = report.warnings,
                duration_ms = duration.as_millis() as u64,
                "Sync completed"
            );

            Ok(SYNC_OK_BODY)
        }
        Err(e) => {
            let status = match e {
                SyncError::Cancelled => "cancelled",
                SyncError::Configuration(_) | SyncError::Execution(_) => "error",
            };
            let duration = timer.finish(status);

            tracing::warn!(
                target: "sync.handlers.sync",
                email = %identity.principal(),
                status = status,
                duration_ms = duration.as_millis() as u64,
                "Sync did not complete"
            );

            Err(TriggerError::SyncExecution(e))
        }
    }
}
