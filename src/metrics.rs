//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Auth metrics
    pub static ref LOGINS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("dox_logins_total", "Total number of successful logins"),
        &["provider"]
    ).expect("metric can be created");
    pub static ref TOKEN_ROTATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("dox_token_rotations_total", "Total number of refresh token rotations"),
        &["status"]
    ).expect("metric can be created");
    pub static ref MAGIC_LINK_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("dox_magic_link_requests_total", "Total number of magic link requests"),
        &["status"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("dox_errors_total", "Total number of errors"),
        &["error_type", "component"]
    ).expect("metric can be created");
}

/// Register all metrics with the global registry
///
/// Call this once at application startup.
pub fn init_metrics() {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(LOGINS_TOTAL.clone()),
        Box::new(TOKEN_ROTATIONS_TOTAL.clone()),
        Box::new(MAGIC_LINK_REQUESTS_TOTAL.clone()),
        Box::new(ERRORS_TOTAL.clone()),
    ];

    for metric in metrics {
        if let Err(e) = REGISTRY.register(metric) {
            tracing::warn!(error = %e, "Failed to register metric");
        }
    }

    tracing::info!("Metrics initialized");
}
