//! Test server harness for E2E testing
//!
//! Provides `TestSpotServer` for spawning real spot-api instances in tests.
//! The server is wired from a `Config` built with `Config::from_vars`, the
//! same path production takes from the environment.

use crate::token_builders::{TEST_AUDIENCE, TEST_ISSUER, TEST_JWT_SECRET};
use metrics_exporter_prometheus::PrometheusBuilder;
use spot_api::auth::{JwksClient, OidcValidator, TokenIssuer};
use spot_api::config::Config;
use spot_api::middleware::{AuthState, RateLimitState};
use spot_api::revocation::{MemoryRevocationStore, RevocationStore};
use spot_api::routes::{self, AppState};
use spot_api::services::RateLimiter;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Options for [`TestSpotServer::spawn_with`].
///
/// Values are environment variable overrides; see `Config::from_vars`.
#[derive(Clone, Default)]
pub struct TestServerOptions {
    vars: HashMap<String, String>,
    revocation_store: Option<Arc<dyn RevocationStore>>,
}

impl TestServerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override any configuration variable.
    pub fn var(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.insert(name.to_string(), value.into());
        self
    }

    pub fn rate_limit(self, requests: u32, window_seconds: u64) -> Self {
        self.var("RATE_LIMIT_REQUESTS", requests.to_string())
            .var("RATE_LIMIT_WINDOW_SECONDS", window_seconds.to_string())
    }

    pub fn trusted_proxies(self, list: &str) -> Self {
        self.var("TRUSTED_PROXIES", list)
    }

    /// Enable the provider route against a JWKS endpoint.
    pub fn oidc(self, issuer: &str, audience: &str, jwks_url: &str) -> Self {
        self.var("OIDC_ISSUER", issuer)
            .var("OIDC_AUDIENCE", audience)
            .var("OIDC_JWKS_URL", jwks_url)
    }

    /// Use `store` instead of a fresh in-memory store.
    pub fn revocation_store(mut self, store: Arc<dyn RevocationStore>) -> Self {
        self.revocation_store = Some(store);
        self
    }
}

/// Test harness for spawning spot-api in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() -> anyhow::Result<()> {
///     let server = TestSpotServer::spawn().await?;
///     let response = reqwest::get(format!("{}/v1/health", server.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestSpotServer {
    addr: SocketAddr,
    config: Config,
    state: Arc<AppState>,
    _handle: JoinHandle<()>,
}

impl TestSpotServer {
    /// Spawn a server with default test configuration.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with(TestServerOptions::new()).await
    }

    /// Spawn a server with configuration overrides.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Use an in-memory revocation store unless one is given
    /// - Start the rate-limit sweeper
    pub async fn spawn_with(options: TestServerOptions) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("JWT_SECRET".to_string(), TEST_JWT_SECRET.to_string()),
            ("JWT_ISSUER".to_string(), TEST_ISSUER.to_string()),
            ("JWT_AUDIENCE".to_string(), TEST_AUDIENCE.to_string()),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("ACCESS_TOKEN_TTL_SECONDS".to_string(), "900".to_string()),
            ("REFRESH_TOKEN_TTL_SECONDS".to_string(), "86400".to_string()),
        ]);
        vars.extend(options.vars);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let revocation_store = options
            .revocation_store
            .unwrap_or_else(|| Arc::new(MemoryRevocationStore::new()));

        let oidc = match &config.oidc {
            Some(oidc_config) => {
                let jwks_client = JwksClient::new(
                    oidc_config.jwks_url.clone(),
                    oidc_config.jwks_timeout,
                    oidc_config.jwks_cache_ttl,
                )
                .map_err(|e| anyhow::anyhow!("Failed to create JWKS client: {}", e))?;
                Some(Arc::new(OidcValidator::new(
                    Arc::new(jwks_client),
                    oidc_config.issuer.clone(),
                    oidc_config.audience.clone(),
                    config.jwt_clock_skew,
                )))
            }
            None => None,
        };

        let limiter = RateLimiter::new(config.rate_limit_requests, config.rate_limit_window);
        limiter.start();

        let state = Arc::new(AppState {
            auth: AuthState {
                issuer: Arc::new(TokenIssuer::new(
                    &config.jwt_secret,
                    config.jwt_issuer.clone(),
                    config.jwt_audience.clone(),
                    config.access_token_ttl,
                    config.refresh_token_ttl,
                )),
                revocation_store,
                revocation_timeout: config.revocation_timeout,
                cookie_name: Arc::from(config.session_cookie_name.as_str()),
                oidc,
            },
            rate_limit: RateLimitState {
                limiter,
                trusted_proxies: Arc::new(config.trusted_proxies.clone()),
            },
            // Not installed globally: several servers may run in one process
            metrics_handle: PrometheusBuilder::new().build_recorder().handle(),
        });

        let app = routes::build_routes(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            state,
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

    /// The issuer the server verifies with, for minting test tokens.
    pub fn issuer(&self) -> &TokenIssuer {
        &self.state.auth.issuer
    }

    /// The server's revocation store.
    pub fn revocation_store(&self) -> &Arc<dyn RevocationStore> {
        &self.state.auth.revocation_store
    }

    /// The server's rate limiter.
    pub fn limiter(&self) -> &RateLimiter {
        &self.state.rate_limit.limiter
    }
}

impl Drop for TestSpotServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
