//! Business services for the admission layer.

pub mod rate_limiter;
pub mod session_service;

pub use rate_limiter::{RateLimitDecision, RateLimiter};
