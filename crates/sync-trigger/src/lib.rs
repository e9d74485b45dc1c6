//! Bucket Sync Trigger Library
//!
//! An authenticated HTTP trigger that runs a one-way bucket sync (by default
//! Google Cloud Storage to Amazon S3) each time an external scheduler calls
//! it with a valid OIDC identity token.
//!
//! # Architecture
//!
//! ```text
//! request -> middleware/auth.rs -> handlers/sync.rs -> storage/engine.rs -> response
//! ```
//!
//! # Modules
//!
//! - `auth` - JWKS key set, identity token verification
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Bearer auth gate, HTTP metrics
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup
//! - `storage` - Backend descriptors, sync engine seam, single-flight guard

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod routes;
pub mod storage;
