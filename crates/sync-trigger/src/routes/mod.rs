//! HTTP routes for the sync trigger.
//!
//! Defines the Axum router and application state.

use crate::auth::TokenVerifier;
use crate::config::Config;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_auth, AuthState};
use crate::storage::{SyncEngine, SyncGuard};
use axum::{middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

pub use crate::observability::metrics::init_metrics_recorder;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Token verifier over the startup key set.
    pub verifier: Arc<TokenVerifier>,

    /// Transfer engine.
    pub engine: Arc<dyn SyncEngine>,

    /// Serializes overlapping triggers when single-flight is enabled.
    pub guard: Arc<SyncGuard>,
}

impl AppState {
    pub fn new(config: Config, verifier: Arc<TokenVerifier>, engine: Arc<dyn SyncEngine>) -> Self {
        let guard = Arc::new(SyncGuard::new(config.single_flight));
        Self {
            config,
            verifier,
            engine,
            guard,
        }
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe (simple "OK") - public
/// - `/metrics` - Prometheus metrics endpoint - public
/// - `/` - Sync trigger (GET, and POST for schedulers that default to it) - requires authentication
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - Request timeout from configuration
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let auth_state = AuthState {
        verifier: state.verifier.clone(),
    };
    let request_timeout = Duration::from_secs(state.config.request_timeout_seconds);

    // Public routes (no authentication required)
    let public_routes = Router::new().route("/health", get(handlers::health_check));

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        .route(
            "/",
            get(handlers::trigger_sync).post(handlers::trigger_sync),
        )
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth))
        .with_state(state);

    // Merge routes and apply global middleware layers
    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(middleware::from_fn(http_metrics_middleware))
}
