//! HTTP middleware: admission (auth), rate limiting, client identification.

pub mod auth;
pub mod client_ip;
pub mod rate_limit;

pub use auth::{optional_auth, require_auth, require_provider_auth, AuthState};
pub use client_ip::{IpNet, TrustedProxies};
pub use rate_limit::{rate_limit, RateLimitState};
