//! # Sync Trigger Test Utilities
//!
//! Shared test utilities for the sync trigger service.
//!
//! This crate provides:
//! - Deterministic Ed25519 and fixed RSA signing keys with their JWK documents (`crypto_fixtures`)
//! - A builder for Google-style identity tokens (`identity_token`)
//! - Server test harness (`TestSyncServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sync_test_utils::*;
//! use sync_trigger::storage::mock::MockSyncEngine;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let server = TestSyncServer::spawn(Arc::new(MockSyncEngine::succeeding()), &[]).await?;
//!     let token = IdentityTokenBuilder::new().sign(server.keypair())?;
//!
//!     let response = reqwest::Client::new()
//!         .get(server.url())
//!         .bearer_auth(token)
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod identity_token;
pub mod server_harness;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use identity_token::*;
pub use server_harness::*;
