//! API layer
//!
//! HTTP handlers for:
//! - Auth (OAuth flows, magic links, token lifecycle)
//! - Profile
//! - Repository connections
//! - Metrics (Prometheus)

mod auth;
pub mod metrics;
mod profile;
mod repos;

pub use auth::auth_router;
pub use metrics::metrics_router;
pub use profile::profile_router;
pub use repos::repos_router;
