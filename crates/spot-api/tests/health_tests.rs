//! Public endpoints over a real socket.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use serde_json::Value;
use spot_test_utils::{TestServerOptions, TestSpotServer};

#[tokio::test]
async fn test_health_endpoint() -> Result<()> {
    let server = TestSpotServer::spawn().await?;

    let response = reqwest::get(format!("{}/v1/health", server.url())).await?;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await?;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    Ok(())
}

#[tokio::test]
async fn test_metrics_endpoint_is_prometheus_text() -> Result<()> {
    let server = TestSpotServer::spawn().await?;

    let response = reqwest::get(format!("{}/metrics", server.url())).await?;
    assert_eq!(response.status(), 200);
    response.text().await?;
    Ok(())
}

#[tokio::test]
async fn test_public_endpoints_need_no_token_and_skip_rate_limit() -> Result<()> {
    let server = TestSpotServer::spawn_with(TestServerOptions::new().rate_limit(1, 60)).await?;
    let client = reqwest::Client::new();

    for _ in 0..3 {
        let response = client
            .get(format!("{}/v1/health", server.url()))
            .send()
            .await?;
        assert_eq!(response.status(), 200);
    }
    assert_eq!(server.limiter().tracked_clients(), 0);
    Ok(())
}

#[tokio::test]
async fn test_provider_route_absent_without_oidc() -> Result<()> {
    let server = TestSpotServer::spawn().await?;
    assert!(server.config().oidc.is_none());

    let response = reqwest::get(format!("{}/v1/provider/me", server.url())).await?;
    assert_eq!(response.status(), 404);
    Ok(())
}
