//! JWKS key set for verifying identity tokens.
//!
//! The key set is fetched once at startup from the identity provider's JWKS
//! endpoint (Google's `oauth2/v3/certs` by default) and never refreshed.
//! A failed fetch, or a set with no usable signing keys, is fatal: the
//! server must not start without keys.
//!
//! # Security
//!
//! - Only signing keys (`use` absent or `sig`) are kept
//! - Only key types the verifier can handle are kept (RSA, Ed25519)
//! - A `kid` shared by more than one key is rejected at lookup

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Timeout for the startup JWKS fetch.
const JWKS_FETCH_TIMEOUT_SECONDS: u64 = 10;

/// JSON Web Key from JWKS endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    /// Key type ("RSA" or "OKP").
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    pub kid: String,

    /// RSA modulus (base64url encoded).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url encoded).
    #[serde(default)]
    pub e: Option<String>,

    /// Curve name ("Ed25519" for OKP keys).
    #[serde(default)]
    pub crv: Option<String>,

    /// OKP public key value (base64url encoded).
    #[serde(default)]
    pub x: Option<String>,

    /// Algorithm the key is meant for, if the provider says.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (should be "sig" for signing).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
}

impl Jwk {
    /// Whether the verifier can use this key at all.
    fn is_usable_signing_key(&self) -> bool {
        let for_signing = self.key_use.as_deref().map_or(true, |u| u == "sig");
        let supported = match self.kty.as_str() {
            "RSA" => self.n.is_some() && self.e.is_some(),
            "OKP" => self.crv.as_deref() == Some("Ed25519") && self.x.is_some(),
            _ => false,
        };
        for_signing && supported && !self.kid.is_empty()
    }
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

/// Failure to load the key set.
#[derive(Debug, Error)]
pub enum JwksError {
    #[error("failed to fetch JWKS from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("JWKS endpoint {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("failed to parse JWKS document: {0}")]
    Parse(String),

    #[error("JWKS contains no usable signing keys")]
    Empty,
}

/// Failure to resolve a token's `kid`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyLookupError {
    #[error("no key with kid '{0}'")]
    NotFound(String),

    #[error("more than one key with kid '{0}'")]
    Ambiguous(String),
}

/// Immutable set of verification keys.
#[derive(Debug, Clone)]
pub struct KeySet {
    keys: Vec<Jwk>,
}

impl KeySet {
    /// Build a key set from already-parsed keys.
    ///
    /// Unusable keys are dropped.
    ///
    /// # Errors
    ///
    /// Returns `JwksError::Empty` if no usable signing key remains.
    pub fn from_keys(keys: Vec<Jwk>) -> Result<Self, JwksError> {
        let total = keys.len();
        let keys: Vec<Jwk> = keys
            .into_iter()
            .filter(Jwk::is_usable_signing_key)
            .collect();

        if keys.len() < total {
            tracing::debug!(
                target: "sync.auth.jwks",
                dropped = total - keys.len(),
                "Ignoring JWKS entries that are not usable signing keys"
            );
        }

        if keys.is_empty() {
            return Err(JwksError::Empty);
        }

        Ok(Self { keys })
    }

    /// Parse a JWKS JSON document.
    pub fn from_json(body: &[u8]) -> Result<Self, JwksError> {
        let jwks: JwksResponse =
            serde_json::from_slice(body).map_err(|e| JwksError::Parse(e.to_string()))?;
        Self::from_keys(jwks.keys)
    }

    /// Fetch the key set from `url`.
    ///
    /// # Errors
    ///
    /// Any transport failure, non-2xx status, unparsable body, or empty set.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch(url: &str) -> Result<Self, JwksError> {
        tracing::debug!(target: "sync.auth.jwks", url = %url, "Fetching JWKS");

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(JWKS_FETCH_TIMEOUT_SECONDS))
            .build()
            .map_err(|e| JwksError::Fetch {
                url: url.to_string(),
                source: e,
            })?;

        let response = http_client
            .get(url)
            .send()
            .await
            .map_err(|e| JwksError::Fetch {
                url: url.to_string(),
                source: e,
            })?;

        if !response.status().is_success() {
            return Err(JwksError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| JwksError::Fetch {
            url: url.to_string(),
            source: e,
        })?;

        let key_set = Self::from_json(&body)?;

        tracing::info!(
            target: "sync.auth.jwks",
            key_count = key_set.len(),
            "JWKS loaded"
        );

        Ok(key_set)
    }

    /// Look up the key for `kid`.
    ///
    /// # Errors
    ///
    /// `NotFound` when no key matches, `Ambiguous` when several do.
    pub fn lookup(&self, kid: &str) -> Result<&Jwk, KeyLookupError> {
        let mut matches = self.keys.iter().filter(|k| k.kid == kid);

        match (matches.next(), matches.next()) {
            (Some(key), None) => Ok(key),
            (None, _) => Err(KeyLookupError::NotFound(kid.to_string())),
            (Some(_), Some(_)) => Err(KeyLookupError::Ambiguous(kid.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rsa_key(kid: &str) -> Jwk {
        Jwk {
            kty: "RSA".to_string(),
            kid: kid.to_string(),
            n: Some("sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri".to_string()),
            e: Some("AQAB".to_string()),
            crv: None,
            x: None,
            alg: Some("RS256".to_string()),
            key_use: Some("sig".to_string()),
        }
    }

    fn okp_key(kid: &str) -> Jwk {
        Jwk {
            kty: "OKP".to_string(),
            kid: kid.to_string(),
            n: None,
            e: None,
            crv: Some("Ed25519".to_string()),
            x: Some("11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo".to_string()),
            alg: Some("EdDSA".to_string()),
            key_use: None,
        }
    }

    #[test]
    fn test_jwk_deserialization_google_rsa() {
        let json = r#"{
            "kty": "RSA",
            "kid": "6f7254101f56e41cf35c9926de84a2d552b4c6f1",
            "n": "sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri",
            "e": "AQAB",
            "alg": "RS256",
            "use": "sig"
        }"#;

        let jwk: Jwk = serde_json::from_str(json).unwrap();

        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.kid, "6f7254101f56e41cf35c9926de84a2d552b4c6f1");
        assert_eq!(jwk.e.as_deref(), Some("AQAB"));
        assert_eq!(jwk.key_use.as_deref(), Some("sig"));
        assert!(jwk.x.is_none());
    }

    #[test]
    fn test_from_keys_drops_unusable() {
        let mut encryption_key = rsa_key("enc-key");
        encryption_key.key_use = Some("enc".to_string());

        let mut incomplete_rsa = rsa_key("no-modulus");
        incomplete_rsa.n = None;

        let mut other_curve = okp_key("x25519");
        other_curve.crv = Some("X25519".to_string());

        let key_set = KeySet::from_keys(vec![
            rsa_key("rsa-1"),
            encryption_key,
            incomplete_rsa,
            other_curve,
            okp_key("ed-1"),
        ])
        .unwrap();

        assert_eq!(key_set.len(), 2);
        assert!(key_set.lookup("rsa-1").is_ok());
        assert!(key_set.lookup("ed-1").is_ok());
        assert_eq!(
            key_set.lookup("enc-key"),
            Err(KeyLookupError::NotFound("enc-key".to_string()))
        );
    }

    #[test]
    fn test_from_keys_empty_is_error() {
        assert!(matches!(KeySet::from_keys(vec![]), Err(JwksError::Empty)));

        let mut enc = rsa_key("enc-only");
        enc.key_use = Some("enc".to_string());
        assert!(matches!(KeySet::from_keys(vec![enc]), Err(JwksError::Empty)));
    }

    #[test]
    fn test_lookup_not_found_and_ambiguous() {
        let key_set = KeySet::from_keys(vec![rsa_key("dup"), okp_key("dup"), rsa_key("one")])
            .unwrap();

        assert_eq!(key_set.lookup("one").unwrap().kid, "one");
        assert_eq!(
            key_set.lookup("dup"),
            Err(KeyLookupError::Ambiguous("dup".to_string()))
        );
        assert_eq!(
            key_set.lookup("missing"),
            Err(KeyLookupError::NotFound("missing".to_string()))
        );
    }

    #[test]
    fn test_from_json_invalid() {
        assert!(matches!(
            KeySet::from_json(b"not json"),
            Err(JwksError::Parse(_))
        ));
        assert!(matches!(
            KeySet::from_json(br#"{"keys": []}"#),
            Err(JwksError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth2/v3/certs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "keys": [
                    {"kty": "RSA", "kid": "google-1", "n": "sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri", "e": "AQAB", "alg": "RS256", "use": "sig"},
                    {"kty": "OKP", "kid": "ed-1", "crv": "Ed25519", "x": "11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let key_set = KeySet::fetch(&format!("{}/oauth2/v3/certs", server.uri()))
            .await
            .unwrap();

        assert_eq!(key_set.len(), 2);
        assert_eq!(key_set.lookup("google-1").unwrap().kty, "RSA");
    }

    #[tokio::test]
    async fn test_fetch_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = KeySet::fetch(&server.uri()).await;
        assert!(matches!(result, Err(JwksError::Status { status: 503, .. })));
    }

    #[tokio::test]
    async fn test_fetch_empty_set() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"keys": []})))
            .mount(&server)
            .await;

        assert!(matches!(
            KeySet::fetch(&server.uri()).await,
            Err(JwksError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_fetch_unreachable() {
        // Port 9 (discard) is not listening in test environments
        let result = KeySet::fetch("http://127.0.0.1:9/certs").await;
        assert!(matches!(result, Err(JwksError::Fetch { .. })));
    }
}
