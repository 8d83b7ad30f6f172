//! Observability: Prometheus metrics for admission, revocation, rate
//! limiting and key fetching.

pub mod metrics;
