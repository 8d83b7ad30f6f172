//! Common utilities shared across Spot Review services.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT utilities (size limits, header inspection, time checks)
pub mod jwt;
