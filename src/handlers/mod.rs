//! HTTP endpoint handlers for the exporter.
//!
//! - `/metrics`: Prometheus metrics endpoint
//! - `/health`: Health check endpoint
//! - `/`: redirect to `/metrics`

pub mod health;
pub mod metrics;

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;

pub use health::health_handler;
pub use metrics::metrics_handler;

/// Handler for `/`: `301 Moved Permanently` to the metrics page.
pub async fn root_handler() -> impl IntoResponse {
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, "/metrics")])
}
