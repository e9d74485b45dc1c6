//! JWT utilities shared across the bucket-sync crates.
//!
//! This module provides the parts of bearer-token handling that do not need
//! key material:
//! - Size limits applied before any parsing
//! - Clock skew constants for time-based claim validation
//! - Header decoding (`kid` and `alg` extraction)
//! - `iat` validation logic
//! - Base64url decoding of JWK components
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Header decoding does NOT verify the signature; the `kid` is only a lookup
//!   hint into a trusted key set
//! - Error messages are generic; details go to debug logs
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{decode_header, validate_iat, DEFAULT_CLOCK_SKEW};
//!
//! let header = decode_header(token)?;
//! let jwk = key_set.lookup(&header.kid)?;
//! // ... verify the signature with the resolved key ...
//! validate_iat(claims.iat, DEFAULT_CLOCK_SKEW)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Identity tokens from Google are around 1KB with an RS256 signature.
/// Anything over this limit is rejected before base64 decoding or any
/// cryptographic work.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default JWT clock skew tolerance (5 minutes).
///
/// Applied as leeway to `exp` and `nbf`, and as the tolerance for `iat`
/// values in the future.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while inspecting a JWT before signature verification.
///
/// Display output is identical for every variant so that nothing about the
/// failure reaches the caller. Use the variant itself for logging.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The identity token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The identity token is invalid or expired")]
    MalformedToken,

    /// Token is missing required `kid` header.
    #[error("The identity token is invalid or expired")]
    MissingKid,

    /// Token is missing the `alg` header.
    #[error("The identity token is invalid or expired")]
    MissingAlg,

    /// Token `iat` claim is too far in the future.
    #[error("The identity token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Header Types
// =============================================================================

/// The parts of a JWT header needed to pick a verification key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    /// Key ID used to look up the signing key in the key set.
    pub kid: String,

    /// Signing algorithm declared by the token (e.g. `RS256`, `EdDSA`).
    pub alg: String,
}

#[derive(Deserialize)]
struct RawHeader {
    #[serde(default)]
    kid: Option<serde_json::Value>,
    #[serde(default)]
    alg: Option<String>,
}

// =============================================================================
// Functions
// =============================================================================

/// Decode a JWT header without verifying the signature.
///
/// # Security
///
/// - Token size is checked BEFORE any parsing
/// - This function does NOT validate the token signature
/// - The returned `kid` must only be used for lookup in a trusted key set
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - Wrong segment count, bad base64, or invalid JSON
/// - `MissingKid` - `kid` is absent, empty, or not a string
/// - `MissingAlg` - `alg` is absent or empty
pub fn decode_header(token: &str) -> Result<TokenHeader, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    // JWT format: header.payload.signature
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        tracing::debug!(
            target: "common.jwt",
            parts = parts.len(),
            "Token rejected: invalid JWT format"
        );
        return Err(JwtValidationError::MalformedToken);
    }

    let header_part = parts.first().ok_or(JwtValidationError::MalformedToken)?;
    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: RawHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    let kid = header
        .kid
        .as_ref()
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingKid)?;

    let alg = header
        .alg
        .filter(|s| !s.is_empty())
        .ok_or(JwtValidationError::MissingAlg)?;

    Ok(TokenHeader { kid, alg })
}

/// Validate the `iat` (issued-at) claim with clock skew tolerance.
///
/// Rejects tokens whose `iat` lies more than `clock_skew` in the future.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if the iat timestamp is more than
/// `clock_skew` in the future.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // Safe cast: clock_skew is bounded to MAX_CLOCK_SKEW (600 seconds)
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now + clock_skew_secs;

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            clock_skew_secs = clock_skew_secs,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

/// Decode a base64url JWK component (`n`, `e`, `x`).
///
/// JWK members are unpadded base64url, but some providers emit trailing `=`,
/// which is stripped before decoding.
///
/// # Errors
///
/// Returns `base64::DecodeError` if the content is not valid base64url.
pub fn decode_jwk_component(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(value.trim_end_matches('='))
}

// =============================================================================
// Tests
// =============================================================================
