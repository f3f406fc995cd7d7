//! services-metrics-exporter library.
//!
//! Exposes per-container resource usage read from a container runtime as a
//! Prometheus snapshot. The binary in `main.rs` wires these modules into an
//! HTTP server; everything here is usable (and tested) without a live
//! Docker daemon by plugging a different [`runtime::ContainerRuntime`].

pub mod cleaner;
pub mod collector;
pub mod config;
pub mod health_stats;
pub mod metrics;
pub mod runtime;

pub use collector::{Collector, CollectorOptions, Snapshot};
pub use config::Config;
pub use metrics::{MetricKind, MetricSample};
pub use runtime::{ContainerRecord, ContainerRuntime, ContainerState, ResourceSnapshot};

use once_cell::sync::Lazy;

/// Version string shown by `--version`-like outputs and the health page.
pub static BUILD_INFO: Lazy<String> = Lazy::new(|| {
    format!(
        "{} (git {}, built {})",
        env!("CARGO_PKG_VERSION"),
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown"),
    )
});
