//! Metrics endpoint handler for Prometheus scraping.
//!
//! Every request runs one full scrape cycle against the container runtime
//! and encodes the resulting samples; nothing is cached between requests.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use prometheus::TEXT_FORMAT;
use services_metrics_exporter::collector::ScrapeError;
use services_metrics_exporter::metrics::{self, EncodeError};
use tracing::{debug, error, instrument};

use crate::state::SharedState;

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub enum MetricsError {
    /// The inventory could not be listed; the cycle produced nothing.
    ScrapeFailed(ScrapeError),
    EncodingFailed(EncodeError),
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> axum::response::Response {
        match self {
            MetricsError::ScrapeFailed(e) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Scrape failed: {e}\n"),
            )
                .into_response(),
            MetricsError::EncodingFailed(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {e}\n"),
            )
                .into_response(),
        }
    }
}

/// Handler for the /metrics endpoint.
#[instrument(skip(state))]
pub async fn metrics_handler(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, MetricsError> {
    debug!("Processing /metrics request");
    state.health_stats.record_http_request();

    let snapshot = match state.collector.scrape().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            state.health_stats.record_failed_scrape();
            return Err(MetricsError::ScrapeFailed(e));
        }
    };
    state.health_stats.record_scrape(&snapshot);

    let body = metrics::encode(&snapshot.samples).map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        MetricsError::EncodingFailed(e)
    })?;

    debug!(
        "Encoded {} samples ({} bytes)",
        snapshot.samples.len(),
        body.len()
    );
    Ok(([(header::CONTENT_TYPE, TEXT_FORMAT)], body))
}
