//! Spot API
//!
//! Entry point for the location-review API's admission layer.

use common::secret::redact_url_credentials;
use spot_api::auth::{JwksClient, OidcValidator, TokenIssuer};
use spot_api::config::Config;
use spot_api::middleware::{AuthState, RateLimitState};
use spot_api::observability::metrics::init_metrics_recorder;
use spot_api::revocation::{MemoryRevocationStore, RedisRevocationStore, RevocationStore};
use spot_api::routes::{self, AppState};
use spot_api::services::RateLimiter;
use spot_api::tasks::revocation_purge::{start_revocation_purge, DEFAULT_PURGE_INTERVAL};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting spot-api");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        redis = config.redis_url.is_some(),
        oidc = config.oidc.is_some(),
        rate_limit_requests = config.rate_limit_requests,
        rate_limit_window_seconds = config.rate_limit_window.as_secs(),
        trusted_proxies = config.trusted_proxies.ranges().len(),
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics: {}", e);
        e
    })?;

    let tasks_token = CancellationToken::new();
    let mut purge_handle = None;

    let revocation_store: Arc<dyn RevocationStore> = match &config.redis_url {
        Some(url) => {
            info!(url = %redact_url_credentials(url), "Connecting to Redis revocation store...");
            let store = RedisRevocationStore::connect(url).await.map_err(|e| {
                error!("Failed to connect to Redis: {}", e);
                e
            })?;
            info!("Redis connection established");
            Arc::new(store)
        }
        None => {
            warn!(
                "REDIS_URL not set, using in-memory revocation store; \
                 revocations are not shared between instances"
            );
            let store = Arc::new(MemoryRevocationStore::new());
            purge_handle = Some(tokio::spawn(start_revocation_purge(
                store.clone(),
                DEFAULT_PURGE_INTERVAL,
                tasks_token.child_token(),
            )));
            store
        }
    };

    let issuer = Arc::new(TokenIssuer::new(
        &config.jwt_secret,
        config.jwt_issuer.clone(),
        config.jwt_audience.clone(),
        config.access_token_ttl,
        config.refresh_token_ttl,
    ));

    let oidc = match &config.oidc {
        Some(oidc_config) => {
            let jwks_client = JwksClient::new(
                oidc_config.jwks_url.clone(),
                oidc_config.jwks_timeout,
                oidc_config.jwks_cache_ttl,
            )?;
            info!(issuer = %oidc_config.issuer, "External identity provider enabled");
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
            issuer,
            revocation_store,
            revocation_timeout: config.revocation_timeout,
            cookie_name: Arc::from(config.session_cookie_name.as_str()),
            oidc,
        },
        rate_limit: RateLimitState {
            limiter: limiter.clone(),
            trusted_proxies: Arc::new(config.trusted_proxies.clone()),
        },
        metrics_handle,
    });

    let app = routes::build_routes(state);

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("spot-api listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(config.drain))
    .await?;

    limiter.stop().await;
    tasks_token.cancel();
    if let Some(handle) = purge_handle {
        if let Err(e) = handle.await {
            warn!("Revocation purge task did not exit cleanly: {}", e);
        }
    }

    info!("spot-api shutdown complete");

    Ok(())
}

/// `RUST_LOG`-style filtering; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "spot_api=info,tower_http=info".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and the drain period is complete.
async fn shutdown_signal(drain: Duration) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    if drain.is_zero() {
        info!("Skipping drain period (DRAIN_SECONDS=0)");
    } else {
        warn!("Draining connections for {} seconds...", drain.as_secs());
        tokio::time::sleep(drain).await;
        info!("Drain period complete");
    }
}
