//! Application state shared by the HTTP handlers.

use services_metrics_exporter::health_stats::HealthStats;
use services_metrics_exporter::{Collector, Config};
use std::sync::Arc;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub collector: Collector,
    pub config: Arc<Config>,
    pub health_stats: Arc<HealthStats>,
}
