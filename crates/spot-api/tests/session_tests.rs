//! Logout and refresh rotation.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};
use spot_api::auth::TokenKind;
use spot_api::revocation::{MemoryRevocationStore, RevocationStore};
use spot_test_utils::{TestServerOptions, TestSpotServer, UnavailableRevocationStore};
use std::sync::Arc;

#[tokio::test]
async fn test_logout_revokes_token() -> Result<()> {
    let store = Arc::new(MemoryRevocationStore::new());
    let server =
        TestSpotServer::spawn_with(TestServerOptions::new().revocation_store(store.clone()))
            .await?;
    let token = server.issuer().issue_access_token("alice", "alice@example.com")?;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/v1/auth/logout", server.url()))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(store.len(), 1);

    let response = client
        .get(format!("{}/v1/me", server.url()))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_logout_with_paired_refresh_token() -> Result<()> {
    let store = Arc::new(MemoryRevocationStore::new());
    let server =
        TestSpotServer::spawn_with(TestServerOptions::new().revocation_store(store.clone()))
            .await?;
    let access = server.issuer().issue_access_token("alice", "alice@example.com")?;
    let refresh = server.issuer().issue_refresh_token("alice", "alice@example.com")?;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/v1/auth/logout", server.url()))
        .bearer_auth(&access)
        .json(&json!({ "refresh_token": refresh }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(store.len(), 2);

    let response = client
        .post(format!("{}/v1/auth/refresh", server.url()))
        .json(&json!({ "refresh_token": refresh }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_logout_via_cookie() -> Result<()> {
    let server = TestSpotServer::spawn().await?;
    let token = server.issuer().issue_access_token("alice", "alice@example.com")?;

    let response = reqwest::Client::new()
        .post(format!("{}/v1/auth/logout", server.url()))
        .header("cookie", format!("session_token={token}"))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let claims = server.issuer().validate(&token)?;
    assert!(server.revocation_store().is_revoked(&claims.jti).await?);
    Ok(())
}

#[tokio::test]
async fn test_logout_fails_closed_when_store_down() -> Result<()> {
    let server = TestSpotServer::spawn_with(
        TestServerOptions::new().revocation_store(Arc::new(UnavailableRevocationStore::new())),
    )
    .await?;
    let token = server.issuer().issue_access_token("alice", "alice@example.com")?;

    let response = reqwest::Client::new()
        .post(format!("{}/v1/auth/logout", server.url()))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_logouts_all_succeed_with_one_entry() -> Result<()> {
    let store = Arc::new(MemoryRevocationStore::new());
    let server =
        TestSpotServer::spawn_with(TestServerOptions::new().revocation_store(store.clone()))
            .await?;
    let token = server.issuer().issue_access_token("alice", "alice@example.com")?;
    let client = reqwest::Client::new();
    let url = format!("{}/v1/auth/logout", server.url());

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let client = client.clone();
            let url = url.clone();
            let token = token.clone();
            tokio::spawn(async move { client.post(url).bearer_auth(token).send().await })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        assert_eq!(result??.status(), StatusCode::NO_CONTENT);
    }
    assert_eq!(store.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_logout_rejects_refresh_token_as_credential() -> Result<()> {
    let store = Arc::new(MemoryRevocationStore::new());
    let server =
        TestSpotServer::spawn_with(TestServerOptions::new().revocation_store(store.clone()))
            .await?;
    let refresh = server.issuer().issue_refresh_token("alice", "alice@example.com")?;

    let response = reqwest::Client::new()
        .post(format!("{}/v1/auth/logout", server.url()))
        .bearer_auth(&refresh)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(store.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_refresh_rotation() -> Result<()> {
    let server = TestSpotServer::spawn().await?;
    let original = server.issuer().issue_refresh_token("alice", "alice@example.com")?;
    let client = reqwest::Client::new();
    let refresh_url = format!("{}/v1/auth/refresh", server.url());

    let response = client
        .post(&refresh_url)
        .json(&json!({ "refresh_token": original }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let pair: Value = response.json().await?;
    assert_eq!(pair["token_type"], "Bearer");
    assert_eq!(pair["expires_in"], 900);
    let access = pair["access_token"].as_str().unwrap();
    let rotated = pair["refresh_token"].as_str().unwrap();
    assert_ne!(rotated, original);

    // New access token works
    let response = client
        .get(format!("{}/v1/me", server.url()))
        .bearer_auth(access)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    // Old refresh token is spent
    let response = client
        .post(&refresh_url)
        .json(&json!({ "refresh_token": original }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Rotated refresh token still usable
    let response = client
        .post(&refresh_url)
        .json(&json!({ "refresh_token": rotated }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_refresh_rejects_access_token() -> Result<()> {
    let server = TestSpotServer::spawn().await?;
    let access = server.issuer().issue_access_token("alice", "alice@example.com")?;

    let response = reqwest::Client::new()
        .post(format!("{}/v1/auth/refresh", server.url()))
        .json(&json!({ "refresh_token": access }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let claims = server.issuer().validate(&access)?;
    assert_eq!(claims.kind, TokenKind::Access);
    assert!(!server.revocation_store().is_revoked(&claims.jti).await?);
    Ok(())
}

#[tokio::test]
async fn test_refresh_fails_closed_when_store_down() -> Result<()> {
    let server = TestSpotServer::spawn_with(
        TestServerOptions::new().revocation_store(Arc::new(UnavailableRevocationStore::new())),
    )
    .await?;
    let refresh = server.issuer().issue_refresh_token("alice", "alice@example.com")?;

    let response = reqwest::Client::new()
        .post(format!("{}/v1/auth/refresh", server.url()))
        .json(&json!({ "refresh_token": refresh }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    Ok(())
}
