//! Bearer token authentication.
//!
//! The key set is loaded once at startup; each request is verified by
//! [`TokenVerifier::verify`] and yields an [`IdentityDocument`].

pub mod claims;
pub mod jwks;
pub mod jwt;

pub use claims::{Audience, IdentityDocument};
pub use jwks::{Jwk, JwksError, KeyLookupError, KeySet};
pub use jwt::{TokenVerifier, VerificationPolicy, VerifyError};
