//! HTTP routes.
//!
//! Defines the Axum router and application state.

use crate::handlers;
use crate::middleware::{
    optional_auth, rate_limit, require_auth, require_provider_auth, AuthState, RateLimitState,
};
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Per-request deadline for every route.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Token verification, revocation store and optional OIDC validator.
    pub auth: AuthState,

    /// Per-client limiter and trusted proxy list.
    pub rate_limit: RateLimitState,

    /// Prometheus metrics handle for the `/metrics` endpoint.
    pub metrics_handle: PrometheusHandle,
}

/// Build the application routes.
///
/// Public, not rate limited:
/// - `GET /v1/health`
/// - `GET /metrics`
///
/// Rate limited (limiter runs before admission):
/// - `POST /v1/auth/refresh` - refresh token in the body
/// - `POST /v1/auth/logout` - access token checked by the handler
/// - `GET /v1/me` - access token required
/// - `GET /v1/session` - access token optional
/// - `GET /v1/provider/me` - provider token required; mounted only when OIDC
///   is configured
pub fn build_routes(state: Arc<AppState>) -> Router {
    let protected_routes = Router::new()
        .route("/v1/me", get(handlers::get_me))
        .layer(from_fn_with_state(state.auth.clone(), require_auth));

    let optional_routes = Router::new()
        .route("/v1/session", get(handlers::get_session))
        .layer(from_fn_with_state(state.auth.clone(), optional_auth));

    let mut api_routes = Router::new()
        .route("/v1/auth/refresh", post(handlers::refresh))
        .route("/v1/auth/logout", post(handlers::logout))
        .merge(protected_routes)
        .merge(optional_routes);

    if state.auth.oidc.is_some() {
        let provider_routes = Router::new()
            .route("/v1/provider/me", get(handlers::get_provider_me))
            .layer(from_fn_with_state(state.auth.clone(), require_provider_auth));
        api_routes = api_routes.merge(provider_routes);
    }

    let api_routes = api_routes
        .layer(from_fn_with_state(state.rate_limit.clone(), rate_limit))
        .with_state(state.clone());

    let public_routes = Router::new()
        .route("/v1/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(state.metrics_handle.clone());

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - bound the whole request
    // 2. TraceLayer - log request details
    api_routes
        .merge(public_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::issuer::TokenIssuer;
    use crate::middleware::client_ip::TrustedProxies;
    use crate::revocation::MemoryRevocationStore;
    use crate::services::rate_limiter::RateLimiter;
    use axum::{
        body::Body,
        extract::ConnectInfo,
        http::{Request, StatusCode},
    };
    use common::secret::SecretString;
    use http_body_util::BodyExt;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::net::SocketAddr;
    use tower::ServiceExt;

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    fn app(limit: u32) -> (Router, Arc<AppState>) {
        let state = Arc::new(AppState {
            auth: AuthState {
                issuer: Arc::new(TokenIssuer::new(
                    &SecretString::from("routes-test-secret-that-is-32-bytes"),
                    "spot-api",
                    "spot-api",
                    Duration::from_secs(900),
                    Duration::from_secs(86_400),
                )),
                revocation_store: Arc::new(MemoryRevocationStore::new()),
                revocation_timeout: Duration::from_millis(500),
                cookie_name: Arc::from("session_token"),
                oidc: None,
            },
            rate_limit: RateLimitState {
                limiter: RateLimiter::new(limit, Duration::from_secs(60)),
                trusted_proxies: Arc::new(TrustedProxies::default()),
            },
            metrics_handle: PrometheusBuilder::new().build_recorder().handle(),
        });
        (build_routes(state.clone()), state)
    }

    fn request(method: &str, uri: &str, bearer: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let mut req = builder.body(Body::from(body.to_string())).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo("192.0.2.10:4000".parse::<SocketAddr>().unwrap()));
        req
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_public_and_unlimited() {
        let (app, _) = app(1);
        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(request("GET", "/v1/health", None, ""))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_metrics_endpoint_is_public() {
        let (app, _) = app(1);
        let response = app
            .oneshot(request("GET", "/metrics", None, ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_me_requires_token() {
        let (app, _) = app(10);
        let response = app
            .oneshot(request("GET", "/v1/me", None, ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key("www-authenticate"));
        assert_eq!(json_body(response).await["error"]["code"], "MISSING_TOKEN");
    }

    #[tokio::test]
    async fn test_me_returns_context() {
        let (app, state) = app(10);
        let token = state.auth.issuer.issue_access_token("u1", "u1@example.com").unwrap();

        let response = app
            .oneshot(request("GET", "/v1/me", Some(&token), ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-ratelimit-limit"));

        let body = json_body(response).await;
        assert_eq!(body["user_id"], "u1");
        assert_eq!(body["email"], "u1@example.com");
    }

    #[tokio::test]
    async fn test_session_reports_anonymous() {
        let (app, _) = app(10);
        let response = app
            .oneshot(request("GET", "/v1/session", None, ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["authenticated"], false);
    }

    #[tokio::test]
    async fn test_logout_then_token_rejected() {
        let (app, state) = app(10);
        let token = state.auth.issuer.issue_access_token("u1", "u1@example.com").unwrap();

        let response = app
            .clone()
            .oneshot(request("POST", "/v1/auth/logout", Some(&token), ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(request("GET", "/v1/me", Some(&token), ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"]["code"], "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn test_logout_requires_token() {
        let (app, _) = app(10);
        let response = app
            .oneshot(request("POST", "/v1/auth/logout", None, ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"]["code"], "MISSING_TOKEN");
    }

    #[tokio::test]
    async fn test_repeated_logout_is_no_content() {
        let (app, state) = app(10);
        let token = state.auth.issuer.issue_access_token("u1", "u1@example.com").unwrap();

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(request("POST", "/v1/auth/logout", Some(&token), ""))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NO_CONTENT);
        }
    }

    #[tokio::test]
    async fn test_refresh_with_bad_body_is_400() {
        let (app, _) = app(10);
        let response = app
            .oneshot(request("POST", "/v1/auth/refresh", None, "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_provider_route_not_mounted_without_oidc() {
        let (app, _) = app(10);
        let response = app
            .oneshot(request("GET", "/v1/provider/me", Some("x.y.z"), ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rate_limit_applies_before_admission() {
        let (app, _) = app(1);
        let first = app
            .clone()
            .oneshot(request("GET", "/v1/me", None, ""))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::UNAUTHORIZED);

        let second = app
            .oneshot(request("GET", "/v1/me", None, ""))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
