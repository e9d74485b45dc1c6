//! Builder for Google-style identity tokens.
//!
//! Produces the claim set a Cloud Scheduler OIDC token carries, with every
//! field overridable so tests can knock out one check at a time.

use crate::crypto_fixtures::{FixtureError, TestKeypair, TestRsaKeypair};
use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Audience the harness configures the service with.
pub const TEST_AUDIENCE: &str = "https://sync-trigger-test.a.run.app";

/// Service account email the builder puts in tokens by default.
pub const TEST_EMAIL: &str = "scheduler@test-project.iam.gserviceaccount.com";

/// Default issuer.
pub const TEST_ISSUER: &str = "https://accounts.google.com";

/// Builder for identity token claims
///
/// # Example
/// ```rust,ignore
/// let token = IdentityTokenBuilder::new()
///     .email("someone-else@example.com")
///     .expires_at(Utc::now().timestamp() - 60)
///     .sign(&keypair)?;
/// ```
#[derive(Debug, Clone)]
pub struct IdentityTokenBuilder {
    iss: String,
    aud: String,
    sub: String,
    azp: String,
    email: Option<String>,
    email_verified: bool,
    iat: i64,
    exp: i64,
    nbf: Option<i64>,
}

impl IdentityTokenBuilder {
    /// A valid token for [`TEST_AUDIENCE`], issued now, expiring in an hour.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            iss: TEST_ISSUER.to_string(),
            aud: TEST_AUDIENCE.to_string(),
            sub: "104857600000000000001".to_string(),
            azp: "104857600000000000001".to_string(),
            email: Some(TEST_EMAIL.to_string()),
            email_verified: true,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(3600)).timestamp(),
            nbf: None,
        }
    }

    pub fn issuer(mut self, issuer: &str) -> Self {
        self.iss = issuer.to_string();
        self
    }

    pub fn audience(mut self, audience: &str) -> Self {
        self.aud = audience.to_string();
        self
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    pub fn email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    /// Drop the `email` claim entirely.
    pub fn without_email(mut self) -> Self {
        self.email = None;
        self
    }

    pub fn email_verified(mut self, verified: bool) -> Self {
        self.email_verified = verified;
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    /// Set expiration timestamp
    pub fn expires_at(mut self, timestamp: i64) -> Self {
        self.exp = timestamp;
        self
    }

    pub fn not_before(mut self, timestamp: i64) -> Self {
        self.nbf = Some(timestamp);
        self
    }

    /// The claim set as JSON.
    pub fn claims(&self) -> Value {
        let mut claims = Map::new();
        claims.insert("iss".to_string(), json!(self.iss));
        claims.insert("aud".to_string(), json!(self.aud));
        claims.insert("sub".to_string(), json!(self.sub));
        claims.insert("azp".to_string(), json!(self.azp));
        if let Some(email) = &self.email {
            claims.insert("email".to_string(), json!(email));
        }
        claims.insert("email_verified".to_string(), json!(self.email_verified));
        claims.insert("iat".to_string(), json!(self.iat));
        claims.insert("exp".to_string(), json!(self.exp));
        if let Some(nbf) = self.nbf {
            claims.insert("nbf".to_string(), json!(nbf));
        }
        Value::Object(claims)
    }

    /// Sign the claims with `keypair`.
    pub fn sign(&self, keypair: &TestKeypair) -> Result<String, FixtureError> {
        keypair.sign(&self.claims())
    }

    /// Sign the claims as RS256 with `keypair`.
    pub fn sign_rsa(&self, keypair: &TestRsaKeypair) -> Result<String, FixtureError> {
        keypair.sign(&self.claims())
    }
}

impl Default for IdentityTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
