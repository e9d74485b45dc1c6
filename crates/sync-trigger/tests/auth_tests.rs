//! Authentication integration tests.
//!
//! Drives the trigger endpoint over real HTTP with the key set served by a
//! mock JWKS endpoint. Every rejection must be a 401 that never reaches the
//! sync engine.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use anyhow::Result;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use reqwest::{header, StatusCode};
use std::sync::Arc;
use sync_test_utils::{IdentityTokenBuilder, TestKeypair, TestSyncServer};
use sync_trigger::storage::mock::MockSyncEngine;

async fn spawn() -> Result<TestSyncServer> {
    TestSyncServer::spawn(Arc::new(MockSyncEngine::succeeding()), &[]).await
}

async fn trigger(server: &TestSyncServer, authorization: Option<String>) -> Result<reqwest::Response> {
    let mut request = reqwest::Client::new().get(server.url());
    if let Some(value) = authorization {
        request = request.header(header::AUTHORIZATION, value);
    }
    Ok(request.send().await?)
}

async fn assert_rejected(server: &TestSyncServer, authorization: Option<String>) -> Result<()> {
    let response = trigger(server, authorization).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let challenge = response
        .headers()
        .get(header::WWW_AUTHENTICATE)
        .expect("401 must carry a challenge")
        .to_str()?
        .to_string();
    assert!(challenge.starts_with("Bearer"));
    assert_eq!(response.text().await?, "Unauthorized");
    assert_eq!(server.engine().call_count(), 0, "engine must not run");

    Ok(())
}

// ============================================================================
// Header handling
// ============================================================================

#[tokio::test]
async fn test_missing_authorization_header() -> Result<()> {
    let server = spawn().await?;
    assert_rejected(&server, None).await
}

#[tokio::test]
async fn test_wrong_scheme() -> Result<()> {
    let server = spawn().await?;
    let token = IdentityTokenBuilder::new().sign(server.keypair())?;

    assert_rejected(&server, Some(format!("Basic {token}"))).await?;
    assert_rejected(&server, Some(format!("bearer {token}"))).await
}

#[tokio::test]
async fn test_empty_bearer_token() -> Result<()> {
    let server = spawn().await?;
    assert_rejected(&server, Some("Bearer ".to_string())).await
}

#[tokio::test]
async fn test_garbage_token() -> Result<()> {
    let server = spawn().await?;
    assert_rejected(&server, Some("Bearer not.a.jwt".to_string())).await
}

// ============================================================================
// Token verification
// ============================================================================

#[tokio::test]
async fn test_valid_token_reaches_engine() -> Result<()> {
    let server = spawn().await?;
    let token = IdentityTokenBuilder::new().sign(server.keypair())?;

    let response = trigger(&server, Some(format!("Bearer {token}"))).await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await?, "ok");
    assert_eq!(server.engine().call_count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_forged_signature() -> Result<()> {
    let server = spawn().await?;
    // Same kid as the published key, different key material
    let forger = TestKeypair::new(99, &server.keypair().kid)?;
    let token = IdentityTokenBuilder::new().sign(&forger)?;

    assert_rejected(&server, Some(format!("Bearer {token}"))).await
}

#[tokio::test]
async fn test_tampered_payload() -> Result<()> {
    let server = spawn().await?;
    let token = IdentityTokenBuilder::new().sign(server.keypair())?;

    let parts: Vec<&str> = token.split('.').collect();
    let payload = URL_SAFE_NO_PAD.encode(
        IdentityTokenBuilder::new()
            .email("someone-else@example.com")
            .claims()
            .to_string(),
    );
    let tampered = format!("{}.{}.{}", parts[0], payload, parts[2]);

    assert_rejected(&server, Some(format!("Bearer {tampered}"))).await
}

#[tokio::test]
async fn test_unknown_kid() -> Result<()> {
    let server = spawn().await?;
    let stranger = TestKeypair::new(1, "rotated-away")?;
    let token = IdentityTokenBuilder::new().sign(&stranger)?;

    assert_rejected(&server, Some(format!("Bearer {token}"))).await
}

#[tokio::test]
async fn test_expired_token() -> Result<()> {
    let server = spawn().await?;
    let now = Utc::now().timestamp();
    let token = IdentityTokenBuilder::new()
        .issued_at(now - 7200)
        .expires_at(now - 3600)
        .sign(server.keypair())?;

    assert_rejected(&server, Some(format!("Bearer {token}"))).await
}

#[tokio::test]
async fn test_wrong_audience() -> Result<()> {
    let server = spawn().await?;
    let token = IdentityTokenBuilder::new()
        .audience("https://another-service.a.run.app")
        .sign(server.keypair())?;

    assert_rejected(&server, Some(format!("Bearer {token}"))).await
}

#[tokio::test]
async fn test_untrusted_issuer() -> Result<()> {
    let server = spawn().await?;
    let token = IdentityTokenBuilder::new()
        .issuer("https://issuer.example.com")
        .sign(server.keypair())?;

    assert_rejected(&server, Some(format!("Bearer {token}"))).await
}

// ============================================================================
// Principal allow-list
// ============================================================================

#[tokio::test]
async fn test_allow_list_accepts_listed_principal() -> Result<()> {
    let server = TestSyncServer::spawn(
        Arc::new(MockSyncEngine::succeeding()),
        &[("ALLOWED_EMAILS", sync_test_utils::TEST_EMAIL)],
    )
    .await?;
    let token = IdentityTokenBuilder::new().sign(server.keypair())?;

    let response = trigger(&server, Some(format!("Bearer {token}"))).await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(server.engine().call_count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_allow_list_rejects_other_principal() -> Result<()> {
    let server = TestSyncServer::spawn(
        Arc::new(MockSyncEngine::succeeding()),
        &[("ALLOWED_EMAILS", sync_test_utils::TEST_EMAIL)],
    )
    .await?;
    let token = IdentityTokenBuilder::new()
        .email("other@test-project.iam.gserviceaccount.com")
        .sign(server.keypair())?;

    assert_rejected(&server, Some(format!("Bearer {token}"))).await
}

#[tokio::test]
async fn test_without_allow_list_any_principal_is_accepted() -> Result<()> {
    let server = spawn().await?;
    let token = IdentityTokenBuilder::new()
        .email("other@test-project.iam.gserviceaccount.com")
        .sign(server.keypair())?;

    let response = trigger(&server, Some(format!("Bearer {token}"))).await?;

    assert_eq!(response.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn test_health_needs_no_token() -> Result<()> {
    let server = spawn().await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(server.engine().call_count(), 0);

    Ok(())
}
