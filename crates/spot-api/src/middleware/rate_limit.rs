//! Rate-limiting middleware.
//!
//! Runs ahead of authentication so unauthenticated abuse is throttled too.
//! Both admitted and rejected responses carry `X-RateLimit-Limit`,
//! `X-RateLimit-Remaining` and `X-RateLimit-Reset`.

use crate::errors::ApiError;
use crate::middleware::client_ip::TrustedProxies;
use crate::observability::metrics;
use crate::services::rate_limiter::{RateLimitDecision, RateLimiter};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// State for the rate-limiting middleware.
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: RateLimiter,
    pub trusted_proxies: Arc<TrustedProxies>,
}

/// Write the three `X-RateLimit-*` headers for `decision`.
pub fn insert_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(
        X_RATELIMIT_RESET,
        HeaderValue::from(decision.reset_at_epoch_secs()),
    );
}

/// Admit or reject the request by client identity.
///
/// The client is identified from the connection's peer address
/// (`ConnectInfo<SocketAddr>`), or from forwarding headers when that peer is
/// a trusted proxy.
pub async fn rate_limit(
    State(state): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let client = state.trusted_proxies.client_identity(peer, req.headers());

    let decision = state.limiter.check(&client);
    if !decision.allowed {
        metrics::record_admission_rejection("RATE_LIMITED");
        return Err(ApiError::RateLimited(decision));
    }

    let mut response = next.run(req).await;
    insert_rate_limit_headers(response.headers_mut(), &decision);
    Ok(response)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(limit: u32, trusted: &str) -> Router {
        let state = RateLimitState {
            limiter: RateLimiter::new(limit, Duration::from_secs(60)),
            trusted_proxies: Arc::new(TrustedProxies::parse_list(trusted).unwrap()),
        };
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(state, rate_limit))
    }

    fn request_from(peer: &str, xff: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/");
        if let Some(xff) = xff {
            builder = builder.header("x-forwarded-for", xff);
        }
        let mut req = builder.body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        req
    }

    #[tokio::test]
    async fn test_admitted_response_has_headers() {
        let app = app(3, "");
        let response = app.oneshot(request_from("192.0.2.1:5000", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(X_RATELIMIT_LIMIT).unwrap(), "3");
        assert_eq!(response.headers().get(X_RATELIMIT_REMAINING).unwrap(), "2");
        assert!(response.headers().get(X_RATELIMIT_RESET).is_some());
    }

    #[tokio::test]
    async fn test_rejection_is_429_with_retry_after() {
        let app = app(1, "");
        let first = app
            .clone()
            .oneshot(request_from("192.0.2.1:5000", None))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(request_from("192.0.2.1:5001", None)).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers().get(X_RATELIMIT_REMAINING).unwrap(), "0");
        assert!(second.headers().get("retry-after").is_some());
    }

    #[tokio::test]
    async fn test_spoofed_forwarded_for_does_not_evade_limit() {
        let app = app(1, "10.0.0.0/8");
        let first = app
            .clone()
            .oneshot(request_from("192.0.2.1:5000", Some("1.1.1.1")))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(request_from("192.0.2.1:5000", Some("2.2.2.2")))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_trusted_proxy_clients_limited_separately() {
        let app = app(1, "10.0.0.0/8");
        for client in ["203.0.113.1", "203.0.113.2"] {
            let response = app
                .clone()
                .oneshot(request_from("10.0.0.2:443", Some(client)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }
}
