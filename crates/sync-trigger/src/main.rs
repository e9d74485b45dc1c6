//! Bucket Sync Trigger
//!
//! Entry point. Loads configuration, fetches the signing keys, and serves
//! the trigger until SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use sync_trigger::auth::{KeySet, TokenVerifier, VerificationPolicy};
use sync_trigger::config::Config;
use sync_trigger::routes::{self, init_metrics_recorder, AppState};
use sync_trigger::storage::{Backend, Role, S3SyncEngine, SyncOptions};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting bucket sync trigger");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        source = %config.sync.source.storage_url(),
        source_kind = %config.sync.source.kind,
        destination = %config.sync.destination.storage_url(),
        destination_kind = %config.sync.destination.kind,
        bind_address = %config.bind_address,
        single_flight = config.single_flight,
        jwt_clock_skew_seconds = config.jwt_clock_skew_seconds,
        "Configuration loaded successfully"
    );

    // The engine reads its own flags from the environment as well; refuse to
    // start if it would reject every run.
    let source = Backend::open(Role::Source, &config.sync.source)?;
    let destination = Backend::open(Role::Destination, &config.sync.destination)?;
    S3SyncEngine::build_config(&source, &destination, SyncOptions::default()).map_err(|e| {
        error!("Sync engine rejected the backend configuration: {}", e);
        e
    })?;

    // Signing keys must be in hand before the listener binds
    let key_set = KeySet::fetch(&config.jwks_url).await.map_err(|e| {
        error!("Failed to load signing keys: {}", e);
        e
    })?;

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    let verifier = Arc::new(TokenVerifier::new(
        Arc::new(key_set),
        VerificationPolicy::from_config(&config),
    ));

    let bind_address = config.bind_address.clone();
    let drain_seconds = config.drain_seconds;

    let state = Arc::new(AppState::new(
        config,
        verifier,
        Arc::new(S3SyncEngine::new()),
    ));

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Sync trigger listening on {}", addr);

    // Start server with graceful shutdown support
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(drain_seconds))
    .await?;

    info!("Sync trigger shutdown complete");

    Ok(())
}

/// Initialize tracing. `LOG_FORMAT=json` switches to JSON lines for log
/// collectors that parse structured output.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sync_trigger=info,tower_http=info".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let fmt_layer = if json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and drain period is complete.
async fn shutdown_signal(drain_secs: u64) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (DRAIN_SECONDS=0)");
    }
}
