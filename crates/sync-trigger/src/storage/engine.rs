//! Sync engine adapter.
//!
//! Wraps the `s3sync` library pipeline behind the [`SyncEngine`] trait so the
//! HTTP layer can request a one-directional sync without knowing about the
//! transfer mechanism, and so tests can substitute [`mock::MockSyncEngine`].
//!
//! # Security
//!
//! - Secret keys are exposed only while building the engine arguments
//! - Arguments are never logged; only bucket URLs are

use crate::storage::backend::{Backend, BackendKind, Credentials};
use async_trait::async_trait;
use common::secret::ExposeSecret;
use s3sync::config::args::build_config_from_args;
use s3sync::config::ClientConfig;
use s3sync::pipeline::Pipeline;
use s3sync::types::{S3Credentials, SyncStatistics};
use s3sync::Config;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Program name passed as argv[0] to the engine's argument parser.
const ENGINE_PROGRAM_NAME: &str = "sync-trigger";

/// Canned ACL applied to every object written to the destination.
const DESTINATION_CANNED_ACL: &str = "private";

/// Options for a single sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Delete destination objects that are absent from the source.
    pub delete: bool,
}

/// Outcome of a completed sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Objects copied to the destination.
    pub transferred: u64,
    /// Objects already up to date.
    pub skipped: u64,
    /// Objects removed from the destination (only with `delete`).
    pub deleted: u64,
    /// Bytes copied.
    pub bytes: u64,
    /// Per-object warnings the engine reported without failing the run.
    pub warnings: u64,
}

/// Sync run failure.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The engine rejected the backend configuration.
    #[error("sync engine configuration rejected: {0}")]
    Configuration(String),

    /// The engine ran and reported errors.
    #[error("sync failed: {0}")]
    Execution(String),

    /// The run was cancelled before completion.
    #[error("sync cancelled")]
    Cancelled,
}

/// Transfer mechanism that copies objects from one backend to another.
#[async_trait]
pub trait SyncEngine: Send + Sync {
    /// Synchronize `source` into `destination`.
    ///
    /// Implementations must stop promptly once `cancellation` fires.
    async fn sync(
        &self,
        source: &Backend,
        destination: &Backend,
        options: SyncOptions,
        cancellation: CancellationToken,
    ) -> Result<SyncReport, SyncError>;
}

/// [`SyncEngine`] backed by the `s3sync` pipeline.
///
/// Google Cloud Storage is addressed through its S3-compatible endpoint, so
/// both sides of the pipeline are S3 storage paths.
#[derive(Debug, Default, Clone)]
pub struct S3SyncEngine;

impl S3SyncEngine {
    pub fn new() -> Self {
        Self
    }

    /// Build the engine's argument vector for a run.
    ///
    /// The returned vector contains secret keys and must not be logged.
    pub fn build_args(source: &Backend, destination: &Backend, options: SyncOptions) -> Vec<String> {
        let mut args = vec![ENGINE_PROGRAM_NAME.to_string()];

        push_backend_args(&mut args, "source", source);
        push_backend_args(&mut args, "target", destination);

        // Objects written to the destination stay private.
        args.push("--acl".to_string());
        args.push(DESTINATION_CANNED_ACL.to_string());

        if options.delete {
            args.push("--delete".to_string());
        }

        args.push(source.storage_url());
        args.push(destination.storage_url());
        args
    }

    /// Build the engine configuration for a run.
    ///
    /// The engine's argument parser also reads every flag from the process
    /// environment (`DELETE`, `DRY_RUN`, `SOURCE_PROFILE`, ...). Flags that
    /// decide what a run does are pinned here to the requested values, so
    /// stray variables cannot turn on deletion or swap credentials.
    pub fn build_config(
        source: &Backend,
        destination: &Backend,
        options: SyncOptions,
    ) -> Result<Config, SyncError> {
        let args = Self::build_args(source, destination, options);
        let mut config = build_config_from_args(args).map_err(SyncError::Configuration)?;

        config.sync_with_delete = options.delete;
        config.dry_run = false;
        pin_credentials(config.source_client_config.as_mut(), source);
        pin_credentials(config.target_client_config.as_mut(), destination);

        Ok(config)
    }
}

fn push_backend_args(args: &mut Vec<String>, side: &str, backend: &Backend) {
    let descriptor = backend.descriptor();

    if let Credentials::Static {
        access_key,
        secret_key,
    } = &descriptor.credentials
    {
        args.push(format!("--{side}-access-key"));
        args.push(access_key.clone());
        args.push(format!("--{side}-secret-access-key"));
        args.push(secret_key.expose_secret().to_string());
    }

    if let Some(region) = &descriptor.region {
        args.push(format!("--{side}-region"));
        args.push(region.clone());
    }

    if let Some(endpoint) = &descriptor.endpoint_url {
        args.push(format!("--{side}-endpoint-url"));
        args.push(endpoint.clone());

        // Custom S3-compatible stores (MinIO and friends) rarely support
        // virtual-hosted buckets; GCS does.
        if descriptor.kind == BackendKind::S3 {
            args.push(format!("--{side}-force-path-style"));
        }
    }
}

/// Ambient credentials mean the provider chain, never a named profile.
fn pin_credentials(client: Option<&mut ClientConfig>, backend: &Backend) {
    if let (Some(client), Credentials::Environment) = (client, &backend.descriptor().credentials) {
        client.credential = S3Credentials::FromEnvironment;
    }
}

/// Drive one pipeline to completion and fold its statistics into a report.
///
/// The pipeline future is not `Send`, so this runs on a blocking thread
/// under [`Handle::block_on`].
async fn run_pipeline(config: Config, cancellation: CancellationToken) -> Result<SyncReport, SyncError> {
    let mut pipeline = Pipeline::new(config, cancellation.clone()).await;
    let stats = pipeline.get_stats_receiver();

    pipeline.run().await;

    let mut report = SyncReport::default();
    while let Ok(stat) = stats.try_recv() {
        match stat {
            SyncStatistics::SyncBytes(bytes) => report.bytes += bytes,
            SyncStatistics::SyncComplete { .. } => report.transferred += 1,
            SyncStatistics::SyncSkip { .. } => report.skipped += 1,
            SyncStatistics::SyncDelete { .. } => report.deleted += 1,
            SyncStatistics::SyncWarning { .. } => report.warnings += 1,
            SyncStatistics::SyncError { .. }
            | SyncStatistics::ETagVerified { .. }
            | SyncStatistics::ChecksumVerified { .. } => {}
        }
    }

    if pipeline.has_error() {
        let detail = pipeline
            .get_errors_and_consume()
            .unwrap_or_default()
            .iter()
            .map(|e| format!("{e:#}"))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(SyncError::Execution(detail));
    }

    if cancellation.is_cancelled() {
        warn!(target: "sync.storage", "Sync pipeline cancelled before completion");
        return Err(SyncError::Cancelled);
    }

    if pipeline.has_warning() {
        warn!(
            target: "sync.storage",
            warnings = report.warnings,
            "Sync completed with warnings"
        );
    }

    Ok(report)
}

#[async_trait]
impl SyncEngine for S3SyncEngine {
    #[instrument(
        skip_all,
        name = "sync.storage.run",
        fields(source = %source.storage_url(), destination = %destination.storage_url())
    )]
    async fn sync(
        &self,
        source: &Backend,
        destination: &Backend,
        options: SyncOptions,
        cancellation: CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let config = Self::build_config(source, destination, options)?;

        debug!(
            target: "sync.storage",
            source_kind = %source.kind(),
            destination_kind = %destination.kind(),
            delete = options.delete,
            "Starting sync pipeline"
        );

        let handle = Handle::current();
        tokio::task::spawn_blocking(move || handle.block_on(run_pipeline(config, cancellation)))
            .await
            .map_err(|e| SyncError::Execution(format!("sync task failed: {e}")))?
    }
}

/// Mock engine for testing.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Mock sync engine.
    ///
    /// Records every call, tracks how many runs overlap, and can be told to
    /// fail or to take a while.
    pub struct MockSyncEngine {
        /// Number of calls made.
        call_count: AtomicUsize,
        /// Runs currently in progress.
        in_flight: AtomicUsize,
        /// Highest number of overlapping runs observed.
        max_in_flight: AtomicUsize,
        /// Whether to return errors.
        return_error: bool,
        /// Simulated run time.
        delay: Duration,
        /// Report returned on success.
        report: SyncReport,
        /// Source and destination URLs of each call, in order.
        calls: Mutex<Vec<(String, String, SyncOptions)>>,
    }

    impl MockSyncEngine {
        fn build(return_error: bool, delay: Duration) -> Self {
            Self {
                call_count: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                return_error,
                delay,
                report: SyncReport {
                    transferred: 3,
                    skipped: 1,
                    deleted: 0,
                    bytes: 3072,
                    warnings: 0,
                },
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Create a mock that always succeeds immediately.
        pub fn succeeding() -> Self {
            Self::build(false, Duration::ZERO)
        }

        /// Create a mock that always fails.
        pub fn failing() -> Self {
            Self::build(true, Duration::ZERO)
        }

        /// Create a mock that succeeds after `delay`.
        pub fn with_delay(delay: Duration) -> Self {
            Self::build(false, delay)
        }

        /// Get the number of calls made.
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        /// Highest number of runs that were in progress at the same time.
        pub fn max_concurrency(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }

        /// Recorded `(source_url, destination_url, options)` per call.
        pub fn calls(&self) -> Vec<(String, String, SyncOptions)> {
            self.calls
                .lock()
                .map(|calls| calls.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl SyncEngine for MockSyncEngine {
        async fn sync(
            &self,
            source: &Backend,
            destination: &Backend,
            options: SyncOptions,
            cancellation: CancellationToken,
        ) -> Result<SyncReport, SyncError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut calls) = self.calls.lock() {
                calls.push((source.storage_url(), destination.storage_url(), options));
            }

            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            let cancelled = if self.delay.is_zero() {
                false
            } else {
                tokio::select! {
                    () = tokio::time::sleep(self.delay) => false,
                    () = cancellation.cancelled() => true,
                }
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if cancelled {
                return Err(SyncError::Cancelled);
            }
            if self.return_error {
                return Err(SyncError::Execution("Mock sync engine error".to_string()));
            }
            Ok(self.report.clone())
        }
    }
}
