//! Identity token verification.
//!
//! Verifies bearer tokens against the startup key set in three steps:
//! decode the header, look the `kid` up in the [`KeySet`], then verify the
//! signature and claims with [`verify_token`]. Every step is a pure
//! function of its inputs.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - The token `alg` must match the key family (no algorithm confusion)
//! - Signature, `exp`, `nbf`, `aud` and `iss` are always checked
//! - Generic error messages prevent information leakage

use crate::auth::claims::IdentityDocument;
use crate::auth::jwks::{Jwk, KeyLookupError, KeySet};
use crate::config::Config;
use common::jwt::{decode_header, decode_jwk_component, validate_iat, JwtValidationError};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Ed25519 public keys are exactly 32 bytes.
const ED25519_PUBLIC_KEY_LEN: usize = 32;

/// Why a token was rejected.
///
/// Display output is identical for every variant; use [`VerifyError::reason`]
/// for logs and metrics.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("The identity token is invalid or expired")]
    Header(#[from] JwtValidationError),

    #[error("The identity token is invalid or expired")]
    KeyLookup(#[from] KeyLookupError),

    /// The JWK cannot be turned into a verification key.
    #[error("The identity token is invalid or expired")]
    UnusableKey,

    /// Token `alg` does not fit the key.
    #[error("The identity token is invalid or expired")]
    AlgorithmMismatch,

    #[error("The identity token is invalid or expired")]
    InvalidSignature,

    #[error("The identity token is invalid or expired")]
    Expired,

    #[error("The identity token is invalid or expired")]
    NotYetValid,

    #[error("The identity token is invalid or expired")]
    InvalidAudience,

    #[error("The identity token is invalid or expired")]
    InvalidIssuer,

    #[error("The identity token is invalid or expired")]
    InvalidClaims,

    /// Principal is not on the allow-list (or its email is unverified).
    #[error("The identity token is invalid or expired")]
    PrincipalNotAllowed,
}

impl VerifyError {
    /// Short label for logs and the auth failure metric.
    pub fn reason(&self) -> &'static str {
        match self {
            VerifyError::Header(JwtValidationError::TokenTooLarge) => "token_too_large",
            VerifyError::Header(JwtValidationError::IatTooFarInFuture) => "iat_in_future",
            VerifyError::Header(_) => "malformed",
            VerifyError::KeyLookup(KeyLookupError::NotFound(_)) => "unknown_kid",
            VerifyError::KeyLookup(KeyLookupError::Ambiguous(_)) => "ambiguous_kid",
            VerifyError::UnusableKey => "unusable_key",
            VerifyError::AlgorithmMismatch => "algorithm_mismatch",
            VerifyError::InvalidSignature => "invalid_signature",
            VerifyError::Expired => "expired",
            VerifyError::NotYetValid => "not_yet_valid",
            VerifyError::InvalidAudience => "invalid_audience",
            VerifyError::InvalidIssuer => "invalid_issuer",
            VerifyError::InvalidClaims => "invalid_claims",
            VerifyError::PrincipalNotAllowed => "principal_not_allowed",
        }
    }
}

/// What a token must satisfy beyond a valid signature.
#[derive(Debug, Clone)]
pub struct VerificationPolicy {
    /// Required `aud` value.
    pub audience: String,

    /// Accepted `iss` values.
    pub allowed_issuers: Vec<String>,

    /// Accepted principals; empty accepts any.
    pub allowed_emails: Vec<String>,

    /// Leeway applied to `exp`, `nbf` and future `iat`.
    pub leeway: Duration,
}

impl VerificationPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            audience: config.audience.clone(),
            allowed_issuers: config.allowed_issuers.clone(),
            allowed_emails: config.allowed_emails.clone(),
            leeway: Duration::from_secs(config.jwt_clock_skew_seconds.unsigned_abs()),
        }
    }
}

/// Token verifier over an immutable key set.
pub struct TokenVerifier {
    key_set: Arc<KeySet>,
    policy: VerificationPolicy,
}

impl TokenVerifier {
    pub fn new(key_set: Arc<KeySet>, policy: VerificationPolicy) -> Self {
        Self { key_set, policy }
    }

    pub fn key_set(&self) -> &KeySet {
        &self.key_set
    }

    pub fn policy(&self) -> &VerificationPolicy {
        &self.policy
    }

    /// Verify a bearer token and return its identity document.
    ///
    /// # Security Checks
    ///
    /// 1. Size check and header decode (`kid`, `alg`)
    /// 2. Key lookup by `kid`
    /// 3. Signature, `exp`, `nbf`, `aud`, `iss`
    /// 4. `iat` not in the future beyond leeway
    /// 5. Principal allow-list, if configured
    ///
    /// # Errors
    ///
    /// Returns a [`VerifyError`] whose Display is generic.
    #[instrument(skip_all)]
    pub fn verify(&self, token: &str) -> Result<IdentityDocument, VerifyError> {
        let header = decode_header(token)?;

        let jwk = self.key_set.lookup(&header.kid).map_err(|e| {
            tracing::debug!(target: "sync.auth.jwt", kid = %header.kid, error = %e, "Key lookup failed");
            e
        })?;

        let identity = verify_token(token, &header.alg, jwk, &self.policy)?;

        if let Some(iat) = identity.iat {
            validate_iat(iat, self.policy.leeway)?;
        }

        check_principal(&identity, &self.policy.allowed_emails)?;

        tracing::debug!(target: "sync.auth.jwt", "Token validated successfully");
        Ok(identity)
    }
}

/// Build a decoding key and the matching algorithm for `jwk`.
///
/// `token_alg` is the algorithm declared in the token header; it must belong
/// to the key's family and match the JWK's own `alg` if it has one.
pub fn decoding_key_for(jwk: &Jwk, token_alg: &str) -> Result<(DecodingKey, Algorithm), VerifyError> {
    let algorithm = Algorithm::from_str(token_alg).map_err(|_| {
        tracing::debug!(target: "sync.auth.jwt", alg = %token_alg, "Unsupported token algorithm");
        VerifyError::AlgorithmMismatch
    })?;

    if let Some(jwk_alg) = &jwk.alg {
        if jwk_alg != token_alg {
            tracing::warn!(
                target: "sync.auth.jwt",
                kid = %jwk.kid,
                jwk_alg = %jwk_alg,
                token_alg = %token_alg,
                "Token algorithm does not match JWK algorithm"
            );
            return Err(VerifyError::AlgorithmMismatch);
        }
    }

    match jwk.kty.as_str() {
        "RSA" => {
            if !matches!(algorithm, Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512) {
                return Err(VerifyError::AlgorithmMismatch);
            }
            let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
                return Err(VerifyError::UnusableKey);
            };
            let key = DecodingKey::from_rsa_components(n, e).map_err(|err| {
                tracing::error!(target: "sync.auth.jwt", kid = %jwk.kid, error = %err, "Invalid RSA key components");
                VerifyError::UnusableKey
            })?;
            Ok((key, algorithm))
        }
        "OKP" => {
            if algorithm != Algorithm::EdDSA || jwk.crv.as_deref() != Some("Ed25519") {
                return Err(VerifyError::AlgorithmMismatch);
            }
            let x = jwk.x.as_deref().ok_or(VerifyError::UnusableKey)?;
            let public_key = decode_jwk_component(x).map_err(|err| {
                tracing::error!(target: "sync.auth.jwt", kid = %jwk.kid, error = %err, "Invalid public key encoding");
                VerifyError::UnusableKey
            })?;
            if public_key.len() != ED25519_PUBLIC_KEY_LEN {
                tracing::error!(target: "sync.auth.jwt", kid = %jwk.kid, len = public_key.len(), "Invalid Ed25519 public key length");
                return Err(VerifyError::UnusableKey);
            }
            Ok((DecodingKey::from_ed_der(&public_key), algorithm))
        }
        other => {
            tracing::warn!(target: "sync.auth.jwt", kty = %other, "Unexpected JWK key type");
            Err(VerifyError::UnusableKey)
        }
    }
}

/// Verify the signature and standard claims of `token` with `jwk`.
pub fn verify_token(
    token: &str,
    token_alg: &str,
    jwk: &Jwk,
    policy: &VerificationPolicy,
) -> Result<IdentityDocument, VerifyError> {
    let (decoding_key, algorithm) = decoding_key_for(jwk, token_alg)?;

    let mut validation = Validation::new(algorithm);
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.leeway = policy.leeway.as_secs();
    validation.set_audience(&[policy.audience.as_str()]);
    validation.set_issuer(&policy.allowed_issuers);
    validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);

    let token_data = decode::<IdentityDocument>(token, &decoding_key, &validation).map_err(|e| {
        tracing::debug!(target: "sync.auth.jwt", error = %e, "Token verification failed");
        match e.kind() {
            ErrorKind::InvalidSignature => VerifyError::InvalidSignature,
            ErrorKind::ExpiredSignature => VerifyError::Expired,
            ErrorKind::ImmatureSignature => VerifyError::NotYetValid,
            ErrorKind::InvalidAudience => VerifyError::InvalidAudience,
            ErrorKind::InvalidIssuer => VerifyError::InvalidIssuer,
            ErrorKind::InvalidAlgorithm => VerifyError::AlgorithmMismatch,
            _ => VerifyError::InvalidClaims,
        }
    })?;

    Ok(token_data.claims)
}

/// Enforce the principal allow-list.
fn check_principal(identity: &IdentityDocument, allowed_emails: &[String]) -> Result<(), VerifyError> {
    if allowed_emails.is_empty() {
        return Ok(());
    }

    let allowed = identity.email_verified
        && identity
            .email
            .as_ref()
            .is_some_and(|email| allowed_emails.iter().any(|a| a.eq_ignore_ascii_case(email)));

    if !allowed {
        tracing::warn!(
            target: "sync.auth.jwt",
            email_verified = identity.email_verified,
            "Principal not on allow-list"
        );
        return Err(VerifyError::PrincipalNotAllowed);
    }

    Ok(())
}
