//! # Spot Test Utilities
//!
//! Shared test utilities for spot-api.
//!
//! This crate provides:
//! - Server test harness (`TestSpotServer` for E2E tests)
//! - Token builders for hand-crafted self-issued and provider claims
//! - Deterministic Ed25519 keypairs and JWKS documents for the OIDC path
//! - Revocation store doubles (unavailable, slow)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use spot_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let server = TestSpotServer::spawn().await?;
//!     let token = server.issuer().issue_access_token("alice", "alice@example.com")?;
//!
//!     let response = reqwest::Client::new()
//!         .get(format!("{}/v1/me", server.url()))
//!         .bearer_auth(token)
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod revocation_stores;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use revocation_stores::*;
pub use server_harness::*;
pub use token_builders::*;
