//! Prometheus scrape endpoint
//!
//! Serves the login, rotation, magic-link, and error counters
//! registered in [`crate::metrics`] as Prometheus text.

use axum::{
    Router,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{Encoder, TextEncoder};

use crate::metrics::REGISTRY;

/// GET /metrics
async fn serve_metrics() -> Response {
    let encoder = TextEncoder::new();

    match encoder.encode_to_string(&REGISTRY.gather()) {
        Ok(text) => {
            ([(header::CONTENT_TYPE, encoder.format_type())], text).into_response()
        }
        Err(error) => {
            tracing::error!(%error, "Metrics encoding failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Router exposing `/metrics`, stateless so it can sit outside the
/// application router.
pub fn metrics_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/metrics", get(serve_metrics))
}
