//! Spot API admission layer.
//!
//! Decides, per request, whether a caller may reach the location-review API:
//!
//! - Self-issued HS256 access/refresh tokens (issue, verify, revoke)
//! - Revocation checks against a shared store, failing closed
//! - Per-client fixed-window rate limiting with trusted-proxy awareness
//! - Tokens from an external OIDC provider, verified against its JWKS
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> middleware/*.rs -> handlers/*.rs -> services/*.rs
//!                        |
//!                        +-> auth/*.rs, revocation/*.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Claims, token issuer/validator, JWKS client, OIDC validator
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Admission and rate-limit middleware
//! - `observability` - Prometheus metrics
//! - `revocation` - Revocation store trait, in-memory and Redis stores
//! - `routes` - Axum router setup
//! - `services` - Rate limiter and session operations
//! - `tasks` - Background tasks

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod revocation;
pub mod routes;
pub mod services;
pub mod tasks;
