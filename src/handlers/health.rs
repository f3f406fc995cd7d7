//! Health check endpoint handler.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use services_metrics_exporter::BUILD_INFO;
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Footer text for human-readable HTTP endpoints.
pub const FOOTER_TEXT: &str = "services-metrics-exporter: GET /metrics for Prometheus, GET /health for this page";

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");

    state.health_stats.record_http_request();

    let (status, message) = if state.health_stats.last_scrape_failed() {
        (StatusCode::SERVICE_UNAVAILABLE, "Last scrape failed")
    } else if state.health_stats.total_scrapes() == 0 {
        (StatusCode::OK, "OK - No scrape yet")
    } else {
        (StatusCode::OK, "OK")
    };

    let table = state.health_stats.render_table();

    debug!("Health check: {} - {}", status, message);
    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!(
            "{message}\n\nversion: {}\ncontainers selected: {}\n\n{table}\n{FOOTER_TEXT}\n",
            *BUILD_INFO,
            if state.collector.filter().collect_all() {
                "all".to_string()
            } else {
                state.config.services.join(", ")
            }
        ),
    )
}
