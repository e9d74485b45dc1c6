//! Test server harness for E2E testing
//!
//! Provides `TestSyncServer` for spawning real sync trigger instances in
//! tests, with the signing keys served by a mock JWKS endpoint.

use crate::crypto_fixtures::{jwks_json, TestKeypair};
use crate::identity_token::TEST_AUDIENCE;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use sync_trigger::auth::{KeySet, TokenVerifier, VerificationPolicy};
use sync_trigger::config::Config;
use sync_trigger::routes::{self, AppState};
use sync_trigger::storage::mock::MockSyncEngine;
use tokio::task::JoinHandle;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock JWKS endpoint is served at.
pub const JWKS_PATH: &str = "/oauth2/v3/certs";

/// Test harness for spawning the sync trigger in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() -> Result<()> {
///     let server = TestSyncServer::spawn(Arc::new(MockSyncEngine::succeeding()), &[]).await?;
///
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestSyncServer {
    addr: SocketAddr,
    config: Config,
    keypair: TestKeypair,
    engine: Arc<MockSyncEngine>,
    _jwks_server: MockServer,
    _handle: JoinHandle<()>,
}

impl TestSyncServer {
    /// Spawn a new test server instance.
    ///
    /// The server will:
    /// - Fetch its key set from a mock JWKS endpoint publishing one Ed25519 key
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Start the HTTP server in the background
    ///
    /// # Arguments
    /// * `engine` - Mock engine the trigger handler calls
    /// * `extra_vars` - Environment overrides on top of a minimal valid set
    pub async fn spawn(
        engine: Arc<MockSyncEngine>,
        extra_vars: &[(&str, &str)],
    ) -> Result<Self, anyhow::Error> {
        Self::spawn_configured(engine, extra_vars, |_| {}).await
    }

    /// Like [`TestSyncServer::spawn`], but lets the caller edit the parsed
    /// configuration before the server starts. Used to reach states the
    /// environment parser refuses to produce.
    pub async fn spawn_configured(
        engine: Arc<MockSyncEngine>,
        extra_vars: &[(&str, &str)],
        edit: impl FnOnce(&mut Config),
    ) -> Result<Self, anyhow::Error> {
        let keypair = TestKeypair::new(1, "test-key-01")?;

        let jwks_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json(&[&keypair])))
            .mount(&jwks_server)
            .await;

        let mut vars = HashMap::from([
            ("AUDIENCE".to_string(), TEST_AUDIENCE.to_string()),
            ("SOURCE_BUCKET".to_string(), "gcs-source".to_string()),
            ("SOURCE_ACCESS_KEY_ID".to_string(), "GOOGTESTHMACKEY".to_string()),
            ("SOURCE_SECRET_ACCESS_KEY".to_string(), "test-hmac-secret".to_string()),
            ("DESTINATION_BUCKET".to_string(), "s3-destination".to_string()),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            (
                "JWKS_URL".to_string(),
                format!("{}{}", jwks_server.uri(), JWKS_PATH),
            ),
        ]);
        for (name, value) in extra_vars {
            vars.insert((*name).to_string(), (*value).to_string());
        }

        let mut config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;
        edit(&mut config);

        let key_set = KeySet::fetch(&config.jwks_url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to fetch key set: {}", e))?;
        let verifier = Arc::new(TokenVerifier::new(
            Arc::new(key_set),
            VerificationPolicy::from_config(&config),
        ));

        let state = Arc::new(AppState::new(config.clone(), verifier, engine.clone()));

        // A detached recorder handle; the global recorder is left alone so
        // parallel tests do not race to install it.
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            keypair,
            engine,
            _jwks_server: jwks_server,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Key published by the mock JWKS endpoint.
    pub fn keypair(&self) -> &TestKeypair {
        &self.keypair
    }

    /// Engine the trigger handler calls.
    pub fn engine(&self) -> &MockSyncEngine {
        &self.engine
    }
}

impl Drop for TestSyncServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity_token::IdentityTokenBuilder;

    #[tokio::test]
    async fn test_server_spawns_successfully() -> Result<(), anyhow::Error> {
        let server = TestSyncServer::spawn(Arc::new(MockSyncEngine::succeeding()), &[]).await?;

        assert!(server.url().starts_with("http://127.0.0.1:"));
        assert!(server.addr().ip().is_loopback());

        let response = reqwest::get(format!("{}/health", server.url())).await?;
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await?, "OK");

        Ok(())
    }

    #[tokio::test]
    async fn test_server_applies_overrides() -> Result<(), anyhow::Error> {
        let server = TestSyncServer::spawn(
            Arc::new(MockSyncEngine::succeeding()),
            &[("ALLOWED_EMAILS", "a@example.com,b@example.com")],
        )
        .await?;

        assert_eq!(server.config().allowed_emails.len(), 2);
        assert_eq!(server.config().audience, TEST_AUDIENCE);

        Ok(())
    }

    #[tokio::test]
    async fn test_server_accepts_harness_key() -> Result<(), anyhow::Error> {
        let server = TestSyncServer::spawn(Arc::new(MockSyncEngine::succeeding()), &[]).await?;
        let token = IdentityTokenBuilder::new().sign(server.keypair())?;

        let response = reqwest::Client::new()
            .get(server.url())
            .bearer_auth(token)
            .send()
            .await?;

        assert_eq!(response.status(), 200);
        assert_eq!(server.engine().call_count(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_multiple_servers_different_ports() -> Result<(), anyhow::Error> {
        let server1 = TestSyncServer::spawn(Arc::new(MockSyncEngine::succeeding()), &[]).await?;
        let server2 = TestSyncServer::spawn(Arc::new(MockSyncEngine::succeeding()), &[]).await?;

        assert_ne!(server1.addr(), server2.addr());

        Ok(())
    }
}
