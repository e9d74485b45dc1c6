//! Sync trigger configuration.
//!
//! Configuration is loaded once from environment variables at startup and
//! never mutated. Secret keys are held as `SecretString` and redacted in
//! Debug output.

use crate::storage::{
    Backend, BackendDescriptor, BackendError, BackendKind, Credentials, Role, SyncConfig,
};
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Google's OIDC signing keys.
pub const DEFAULT_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// Issuers Google uses for identity tokens.
pub const DEFAULT_ALLOWED_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default per-request timeout. Large buckets take a while.
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 3600;

/// Default graceful shutdown drain period.
pub const DEFAULT_DRAIN_SECONDS: u64 = 5;

/// Sync trigger configuration.
#[derive(Clone)]
pub struct Config {
    /// Expected `aud` claim of incoming identity tokens.
    pub audience: String,

    /// Source and destination backends.
    pub sync: SyncConfig,

    /// Key set endpoint fetched once at startup.
    pub jwks_url: String,

    /// Accepted `iss` values.
    pub allowed_issuers: Vec<String>,

    /// Accepted principals. Empty means any verified caller.
    pub allowed_emails: Vec<String>,

    /// JWT clock skew tolerance in seconds for token validation.
    pub jwt_clock_skew_seconds: i64,

    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Per-request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Serialize overlapping sync triggers.
    pub single_flight: bool,

    /// Seconds to wait for in-flight requests on shutdown.
    pub drain_seconds: u64,
}

/// Custom Debug implementation that keeps principals out of logs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("audience", &self.audience)
            .field("sync", &self.sync)
            .field("jwks_url", &self.jwks_url)
            .field("allowed_issuers", &self.allowed_issuers)
            .field("allowed_emails", &format!("[{} entries]", self.allowed_emails.len()))
            .field("jwt_clock_skew_seconds", &self.jwt_clock_skew_seconds)
            .field("bind_address", &self.bind_address)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("single_flight", &self.single_flight)
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("{present} is set but {missing} is not; credentials must be set as a pair")]
    IncompleteCredentials { present: String, missing: String },

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid backend configuration: {0}")]
    InvalidBackend(#[from] BackendError),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let audience = required(vars, &["AUDIENCE"])?;
        let source_location = required(vars, &["SOURCE_BUCKET", "GS"])?;
        let destination_location = required(vars, &["DESTINATION_BUCKET", "S3"])?;

        let source_kind = parse_kind(vars, "SOURCE_KIND", BackendKind::Gcs)?;
        let destination_kind = parse_kind(vars, "DESTINATION_KIND", BackendKind::S3)?;

        let source_credentials = credential_pair(
            vars,
            "SOURCE_ACCESS_KEY_ID",
            &["SOURCE_SECRET_ACCESS_KEY"],
        )?;
        // AWS_SECRET_ACCESS_ID is the historical spelling used by existing
        // deployments.
        let destination_credentials = credential_pair(
            vars,
            "AWS_ACCESS_KEY_ID",
            &["AWS_SECRET_ACCESS_KEY", "AWS_SECRET_ACCESS_ID"],
        )?;

        let source = BackendDescriptor::from_location(
            source_kind,
            &source_location,
            optional(vars, "SOURCE_REGION"),
            optional(vars, "SOURCE_ENDPOINT_URL"),
            source_credentials,
        );
        let destination = BackendDescriptor::from_location(
            destination_kind,
            &destination_location,
            optional(vars, "AWS_REGION"),
            optional(vars, "DESTINATION_ENDPOINT_URL"),
            destination_credentials,
        );

        if source.bucket.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "SOURCE_BUCKET".to_string(),
                reason: "bucket name is empty".to_string(),
            });
        }
        if destination.bucket.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "DESTINATION_BUCKET".to_string(),
                reason: "bucket name is empty".to_string(),
            });
        }

        // Anything a trigger would fail on is refused here instead.
        Backend::open(Role::Source, &source)?;
        Backend::open(Role::Destination, &destination)?;

        let jwks_url = optional(vars, "JWKS_URL").unwrap_or_else(|| DEFAULT_JWKS_URL.to_string());

        let allowed_issuers = optional(vars, "ALLOWED_ISSUERS")
            .map(|v| split_list(&v))
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| DEFAULT_ALLOWED_ISSUERS.iter().map(ToString::to_string).collect());

        let allowed_emails = optional(vars, "ALLOWED_EMAILS")
            .map(|v| split_list(&v))
            .unwrap_or_default();

        // Parse JWT clock skew tolerance with validation
        let jwt_clock_skew_seconds = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value <= 0 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be positive, got {}",
                    value
                )));
            }

            if value > MAX_CLOCK_SKEW.as_secs() as i64 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            value
        } else {
            DEFAULT_CLOCK_SKEW.as_secs() as i64
        };

        // Cloud Run injects PORT; an explicit BIND_ADDRESS wins.
        let bind_address = match (optional(vars, "BIND_ADDRESS"), optional(vars, "PORT")) {
            (Some(address), _) => address,
            (None, Some(port)) => {
                let port: u16 = port.parse().map_err(|_| ConfigError::InvalidValue {
                    name: "PORT".to_string(),
                    reason: format!("'{}' is not a valid port", port),
                })?;
                format!("0.0.0.0:{}", port)
            }
            (None, None) => DEFAULT_BIND_ADDRESS.to_string(),
        };

        let request_timeout_seconds =
            parse_positive(vars, "REQUEST_TIMEOUT_SECONDS", DEFAULT_REQUEST_TIMEOUT_SECONDS)?;

        let drain_seconds = match optional(vars, "DRAIN_SECONDS") {
            Some(value) => value.parse().map_err(|e| ConfigError::InvalidValue {
                name: "DRAIN_SECONDS".to_string(),
                reason: format!("'{}': {}", value, e),
            })?,
            None => DEFAULT_DRAIN_SECONDS,
        };

        let single_flight = match optional(vars, "SYNC_SINGLE_FLIGHT") {
            Some(value) => parse_bool(&value).ok_or_else(|| ConfigError::InvalidValue {
                name: "SYNC_SINGLE_FLIGHT".to_string(),
                reason: format!("expected true or false, got '{}'", value),
            })?,
            None => true,
        };

        Ok(Config {
            audience,
            sync: SyncConfig {
                source,
                destination,
            },
            jwks_url,
            allowed_issuers,
            allowed_emails,
            jwt_clock_skew_seconds,
            bind_address,
            request_timeout_seconds,
            single_flight,
            drain_seconds,
        })
    }
}

/// Trimmed, non-empty value of `name`.
fn optional(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// First non-empty value among `names`; the first name is reported if all are missing.
fn required(vars: &HashMap<String, String>, names: &[&str]) -> Result<String, ConfigError> {
    names
        .iter()
        .find_map(|name| optional(vars, name))
        .ok_or_else(|| {
            ConfigError::MissingEnvVar(names.first().copied().unwrap_or_default().to_string())
        })
}

fn parse_kind(
    vars: &HashMap<String, String>,
    name: &str,
    default: BackendKind,
) -> Result<BackendKind, ConfigError> {
    match optional(vars, name) {
        Some(value) => value.parse().map_err(|reason| ConfigError::InvalidValue {
            name: name.to_string(),
            reason,
        }),
        None => Ok(default),
    }
}

/// Static credentials when both halves are present, ambient credentials
/// when neither is, and an error for anything in between.
fn credential_pair(
    vars: &HashMap<String, String>,
    access_key_name: &str,
    secret_key_names: &[&str],
) -> Result<Credentials, ConfigError> {
    let access_key = optional(vars, access_key_name);
    let secret_key = secret_key_names
        .iter()
        .find_map(|name| optional(vars, name));
    let secret_key_name = secret_key_names.first().copied().unwrap_or_default();

    match (access_key, secret_key) {
        (Some(access_key), Some(secret_key)) => Ok(Credentials::Static {
            access_key,
            secret_key: SecretString::from(secret_key),
        }),
        (None, None) => Ok(Credentials::Environment),
        (Some(_), None) => Err(ConfigError::IncompleteCredentials {
            present: access_key_name.to_string(),
            missing: secret_key_name.to_string(),
        }),
        (None, Some(_)) => Err(ConfigError::IncompleteCredentials {
            present: secret_key_name.to_string(),
            missing: access_key_name.to_string(),
        }),
    }
}

fn parse_positive(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(value) = optional(vars, name) else {
        return Ok(default);
    };

    match value.parse::<u64>() {
        Ok(0) => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: "must be greater than 0".to_string(),
        }),
        Ok(parsed) => Ok(parsed),
        Err(e) => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("'{}': {}", value, e),
        }),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}
