//! Utilities shared across the bucket-sync crates.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT header utilities, size limits and clock skew constants
pub mod jwt;
