//! Authentication middleware for the sync route.
//!
//! Extracts the Bearer token from the Authorization header, verifies it
//! against the startup key set, and injects the identity document into
//! request extensions.

use crate::auth::{IdentityDocument, TokenVerifier};
use crate::errors::TriggerError;
use crate::observability::metrics::record_auth_failure;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    /// Token verifier over the startup key set.
    pub verifier: Arc<TokenVerifier>,
}

/// Authentication middleware that verifies identity tokens.
///
/// # Authorization Header Format
///
/// ```text
/// Authorization: Bearer <token>
/// ```
///
/// # Response
///
/// - Returns 401 Unauthorized with WWW-Authenticate header if the token is
///   missing or invalid; the handler is never invoked
/// - Continues to the next handler with the identity in extensions otherwise
#[instrument(skip(state, req, next), name = "sync.middleware.auth")]
pub async fn require_auth(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, TriggerError> {
    let token = bearer_token(&req)?;

    let identity = state.verifier.verify(token).map_err(|e| {
        tracing::info!(
            target: "sync.middleware.auth",
            reason = e.reason(),
            "Rejected request with invalid identity token"
        );
        record_auth_failure(e.reason());
        TriggerError::Unauthorized(e.reason().to_string())
    })?;

    tracing::info!(
        target: "sync.middleware.auth",
        email = %identity.principal(),
        "Authenticated request"
    );

    req.extensions_mut().insert::<IdentityDocument>(identity);

    Ok(next.run(req).await)
}

/// Extract the token from `Authorization: Bearer <token>`.
fn bearer_token(req: &Request) -> Result<&str, TriggerError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "sync.middleware.auth", "Missing Authorization header");
            record_auth_failure("missing_header");
            TriggerError::Unauthorized("missing_header".to_string())
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        tracing::debug!(target: "sync.middleware.auth", "Invalid Authorization header format");
        record_auth_failure("invalid_scheme");
        TriggerError::Unauthorized("invalid_scheme".to_string())
    })?;

    let token = token.trim();
    if token.is_empty() {
        tracing::debug!(target: "sync.middleware.auth", "Empty bearer token");
        record_auth_failure("empty_token");
        return Err(TriggerError::Unauthorized("empty_token".to_string()));
    }

    Ok(token)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with(header_value: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/");
        if let Some(value) = header_value {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_auth_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AuthState>();
    }

    #[test]
    fn test_bearer_token_extracted() {
        let req = request_with(Some("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&req).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_bearer_token_rejections() {
        for header_value in [None, Some("Basic dXNlcjpwYXNz"), Some("Bearer"), Some("Bearer    "), Some("abc.def.ghi")] {
            let req = request_with(header_value);
            assert!(
                matches!(bearer_token(&req), Err(TriggerError::Unauthorized(_))),
                "header {header_value:?} should be rejected"
            );
        }
    }
}
