//! Storage backend descriptors and handles.
//!
//! A [`BackendDescriptor`] is the static description of one side of the sync
//! (provider kind, bucket, prefix, credentials), loaded once from the
//! environment. A [`Backend`] is the validated handle built from a descriptor
//! for a single sync run. Construction re-validates the descriptor every
//! time, so a configuration injected without going through `Config::from_vars`
//! still fails cleanly before any transfer starts.

use common::secret::{ExposeSecret, SecretString};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Google Cloud Storage XML API endpoint (S3-compatible interoperability mode).
pub const GCS_INTEROP_ENDPOINT: &str = "https://storage.googleapis.com";

/// Region string accepted by the GCS interoperability endpoint.
pub const GCS_DEFAULT_REGION: &str = "auto";

/// Object storage provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Google Cloud Storage, reached through its S3-compatible API.
    Gcs,
    /// Amazon S3 or another S3-compatible store.
    S3,
}

impl BackendKind {
    /// Short label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Gcs => "gcs",
            BackendKind::S3 => "s3",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gcs" | "gs" | "google cloud storage" => Ok(BackendKind::Gcs),
            "s3" | "aws" => Ok(BackendKind::S3),
            other => Err(format!("unknown backend kind '{}'", other)),
        }
    }
}

/// Credentials for one backend.
#[derive(Clone, Debug)]
pub enum Credentials {
    /// Static access key pair. The secret is redacted in Debug output.
    Static {
        access_key: String,
        secret_key: SecretString,
    },
    /// Resolve credentials from the ambient provider chain
    /// (environment, instance metadata, workload identity).
    Environment,
}

/// Everything the sync engine needs to address one bucket.
#[derive(Clone, Debug)]
pub struct BackendDescriptor {
    /// Provider kind.
    pub kind: BackendKind,

    /// Bucket (container) name.
    pub bucket: String,

    /// Key prefix inside the bucket; empty for the whole bucket.
    pub prefix: String,

    /// Provider region, if any.
    pub region: Option<String>,

    /// Endpoint override for S3-compatible stores.
    pub endpoint_url: Option<String>,

    /// Access credentials.
    pub credentials: Credentials,
}

impl BackendDescriptor {
    /// Build a descriptor from a `bucket[/prefix]` location string.
    ///
    /// GCS descriptors get the interoperability endpoint and the `auto`
    /// region unless overridden.
    pub fn from_location(
        kind: BackendKind,
        location: &str,
        region: Option<String>,
        endpoint_url: Option<String>,
        credentials: Credentials,
    ) -> Self {
        let location = location.trim().trim_start_matches("gs://").trim_start_matches("s3://");
        let (bucket, prefix) = match location.split_once('/') {
            Some((bucket, prefix)) => (bucket.to_string(), prefix.to_string()),
            None => (location.to_string(), String::new()),
        };

        let (region, endpoint_url) = match kind {
            BackendKind::Gcs => (
                region.or_else(|| Some(GCS_DEFAULT_REGION.to_string())),
                endpoint_url.or_else(|| Some(GCS_INTEROP_ENDPOINT.to_string())),
            ),
            BackendKind::S3 => (region, endpoint_url),
        };

        Self {
            kind,
            bucket,
            prefix,
            region,
            endpoint_url,
            credentials,
        }
    }

    /// The `s3://bucket/prefix/` URL understood by the sync engine.
    ///
    /// A prefix always names a directory. The engine strips it literally
    /// from each key, so it must end in `/`.
    pub fn storage_url(&self) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("s3://{}/", self.bucket)
        } else {
            format!("s3://{}/{}/", self.bucket, prefix)
        }
    }
}

/// The fixed source/destination pair a trigger synchronizes.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Where objects are read from.
    pub source: BackendDescriptor,

    /// Where objects are written to.
    pub destination: BackendDescriptor,
}

/// Failure to construct a backend handle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("{role} bucket name is empty")]
    EmptyBucket { role: &'static str },

    #[error("{role} bucket name '{bucket}' is invalid")]
    InvalidBucket { role: &'static str, bucket: String },

    #[error("{role} access key is empty")]
    EmptyAccessKey { role: &'static str },

    #[error("{role} secret key is empty")]
    EmptySecretKey { role: &'static str },

    #[error("{role} endpoint url '{url}' must use http or https")]
    InvalidEndpoint { role: &'static str, url: String },

    #[error("{role} region is empty")]
    EmptyRegion { role: &'static str },

    #[error("{role} is Google Cloud Storage and needs HMAC credentials")]
    MissingHmacCredentials { role: &'static str },
}

/// Which side of the sync a backend sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Source,
    Destination,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Source => "source",
            Role::Destination => "destination",
        }
    }
}

/// Validated handle to one side of a sync run.
#[derive(Clone, Debug)]
pub struct Backend {
    role: Role,
    descriptor: BackendDescriptor,
}

impl Backend {
    /// Validate a descriptor and build a handle for it.
    pub fn open(role: Role, descriptor: &BackendDescriptor) -> Result<Self, BackendError> {
        let role_name = role.as_str();

        if descriptor.bucket.trim().is_empty() {
            return Err(BackendError::EmptyBucket { role: role_name });
        }

        if !is_valid_bucket_name(&descriptor.bucket) {
            return Err(BackendError::InvalidBucket {
                role: role_name,
                bucket: descriptor.bucket.clone(),
            });
        }

        if let Credentials::Static {
            access_key,
            secret_key,
        } = &descriptor.credentials
        {
            if access_key.trim().is_empty() {
                return Err(BackendError::EmptyAccessKey { role: role_name });
            }
            if secret_key.expose_secret().trim().is_empty() {
                return Err(BackendError::EmptySecretKey { role: role_name });
            }
        }

        // The interoperability endpoint only accepts HMAC keys; the ambient
        // AWS provider chain has nothing it would honor.
        if descriptor.kind == BackendKind::Gcs
            && matches!(descriptor.credentials, Credentials::Environment)
        {
            return Err(BackendError::MissingHmacCredentials { role: role_name });
        }

        if let Some(url) = &descriptor.endpoint_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(BackendError::InvalidEndpoint {
                    role: role_name,
                    url: url.clone(),
                });
            }
        }

        if descriptor
            .region
            .as_deref()
            .is_some_and(|r| r.trim().is_empty())
        {
            return Err(BackendError::EmptyRegion { role: role_name });
        }

        Ok(Self {
            role,
            descriptor: descriptor.clone(),
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    pub fn kind(&self) -> BackendKind {
        self.descriptor.kind
    }

    pub fn storage_url(&self) -> String {
        self.descriptor.storage_url()
    }
}

/// Bucket names shared by S3 and GCS: 3-222 chars of lowercase letters,
/// digits, dots, dashes and underscores, starting and ending alphanumeric.
fn is_valid_bucket_name(bucket: &str) -> bool {
    let len_ok = (3..=222).contains(&bucket.len());
    let chars_ok = bucket
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '-' | '_'));
    let edges_ok = bucket
        .chars()
        .next()
        .zip(bucket.chars().last())
        .is_some_and(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric());

    len_ok && chars_ok && edges_ok
}
