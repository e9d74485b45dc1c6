//! Identity document carried by a verified OIDC identity token.
//!
//! The `email` field is redacted in Debug output to keep principals out of
//! logs that capture whole request extensions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// `aud` claim: a single audience or a list of them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    /// Whether `audience` is among the token's audiences.
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == audience,
            Audience::Multiple(auds) => auds.iter().any(|a| a == audience),
        }
    }
}

/// Claims of a Google-style identity token.
#[derive(Clone, Serialize, Deserialize)]
pub struct IdentityDocument {
    /// Principal email (service account for scheduler invocations).
    #[serde(default)]
    pub email: Option<String>,

    /// Whether the provider has verified the email.
    #[serde(default)]
    pub email_verified: bool,

    /// Authorized party the token was issued to.
    #[serde(default)]
    pub azp: Option<String>,

    /// Issuer.
    pub iss: String,

    /// Audience.
    pub aud: Audience,

    /// Subject (stable principal ID).
    pub sub: String,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Not-before timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
}

impl fmt::Debug for IdentityDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityDocument")
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .field("email_verified", &self.email_verified)
            .field("azp", &self.azp)
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("sub", &self.sub)
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("nbf", &self.nbf)
            .finish()
    }
}

impl IdentityDocument {
    /// Email for logging, or `"unknown"` when the token carries none.
    pub fn principal(&self) -> &str {
        self.email.as_deref().unwrap_or("unknown")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_google_identity_token_claims() {
        let json = r#"{
            "aud": "https://sync-abc123-uc.a.run.app",
            "azp": "107517467455664443765",
            "email": "scheduler@project.iam.gserviceaccount.com",
            "email_verified": true,
            "exp": 1700003600,
            "iat": 1700000000,
            "iss": "https://accounts.google.com",
            "sub": "107517467455664443765"
        }"#;

        let doc: IdentityDocument = serde_json::from_str(json).unwrap();

        assert_eq!(doc.principal(), "scheduler@project.iam.gserviceaccount.com");
        assert!(doc.email_verified);
        assert_eq!(doc.azp.as_deref(), Some("107517467455664443765"));
        assert!(doc.aud.contains("https://sync-abc123-uc.a.run.app"));
        assert_eq!(doc.iat, Some(1_700_000_000));
        assert!(doc.nbf.is_none());
    }

    #[test]
    fn test_deserialize_minimal_claims() {
        let json = r#"{"iss": "accounts.google.com", "aud": ["a", "b"], "sub": "123", "exp": 1}"#;

        let doc: IdentityDocument = serde_json::from_str(json).unwrap();

        assert!(doc.email.is_none());
        assert!(!doc.email_verified);
        assert_eq!(doc.principal(), "unknown");
        assert!(doc.aud.contains("b"));
        assert!(!doc.aud.contains("c"));
    }

    #[test]
    fn test_debug_redacts_email() {
        let doc = IdentityDocument {
            email: Some("person@example.com".to_string()),
            email_verified: true,
            azp: None,
            iss: "accounts.google.com".to_string(),
            aud: Audience::Single("aud".to_string()),
            sub: "123".to_string(),
            exp: 0,
            iat: None,
            nbf: None,
        };

        let debug_str = format!("{:?}", doc);
        assert!(!debug_str.contains("person@example.com"));
        assert!(debug_str.contains("[REDACTED]"));
    }
}
