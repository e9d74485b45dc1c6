//! Sync trigger error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl.
//! Response bodies are the bare status phrase so nothing about the failure
//! reaches the caller. Actual errors are logged server-side.

use crate::storage::{BackendError, SyncError};
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Challenge sent with every 401 response.
pub const WWW_AUTHENTICATE_CHALLENGE: &str = "Bearer realm=\"bucket-sync\", error=\"invalid_token\"";

/// Sync trigger error type.
///
/// Maps to HTTP status codes:
/// - Unauthorized: 401 Unauthorized
/// - BackendConstruction, SyncExecution: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum TriggerError {
    /// Authentication failed. The reason is for logs only.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Backend construction failed: {0}")]
    BackendConstruction(#[from] BackendError),

    #[error("Sync execution failed: {0}")]
    SyncExecution(#[from] SyncError),
}

impl IntoResponse for TriggerError {
    fn into_response(self) -> Response {
        let status = match &self {
            TriggerError::Unauthorized(reason) => {
                tracing::debug!(target: "sync.errors", reason = %reason, "Request rejected");
                StatusCode::UNAUTHORIZED
            }
            TriggerError::BackendConstruction(err) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "sync.errors", error = %err, "Backend construction failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            TriggerError::SyncExecution(err) => {
                tracing::error!(target: "sync.errors", error = %err, "Sync execution failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = status.canonical_reason().unwrap_or("Error");
        let mut response = (status, body).into_response();

        // Add WWW-Authenticate header for 401 responses
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(WWW_AUTHENTICATE_CHALLENGE),
            );
        }

        response
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_cancelled_sync_response_is_500() {
        let response = TriggerError::from(SyncError::Cancelled).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());
        assert_eq!(body_string(response).await, "Internal Server Error");
    }

    #[tokio::test]
    async fn test_unauthorized_response_is_generic() {
        let response =
            TriggerError::Unauthorized("signature mismatch for kid abc".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            WWW_AUTHENTICATE_CHALLENGE
        );
        assert_eq!(body_string(response).await, "Unauthorized");
    }

    #[tokio::test]
    async fn test_backend_error_response_hides_detail() {
        let response = TriggerError::from(BackendError::EmptySecretKey {
            role: "destination",
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());
        assert_eq!(body_string(response).await, "Internal Server Error");
    }

    #[tokio::test]
    async fn test_sync_error_response_hides_detail() {
        let response =
            TriggerError::from(SyncError::Execution("AccessDenied on dest-bucket".to_string()))
                .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_string(response).await, "Internal Server Error");
    }
}
