//! Background tasks.
//!
//! - [`rate_limit_sweeper`] - evicts idle rate-limit budgets
//! - [`revocation_purge`] - drops expired entries from the in-memory
//!   revocation store

pub mod rate_limit_sweeper;
pub mod revocation_purge;
