//! HTTP request handlers.

pub mod health;
pub mod metrics;
pub mod session;

pub use health::health_check;
pub use metrics::metrics_handler;
pub use session::{get_me, get_provider_me, get_session, logout, refresh};
