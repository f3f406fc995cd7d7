//! Startup wiring shared by the server and the subcommands.

use anyhow::Context;
use services_metrics_exporter::collector::{LabelResolver, ServiceFilter};
use services_metrics_exporter::runtime::{DockerRuntime, FixtureRuntime};
use services_metrics_exporter::{Collector, Config, ContainerRuntime};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Connects to the Docker engine named by `docker_host` (or the local default).
pub async fn connect_runtime(config: &Config) -> anyhow::Result<Arc<dyn ContainerRuntime>> {
    let runtime = DockerRuntime::connect(
        config.docker_host.as_deref(),
        config.collect_disk_usage.unwrap_or(false),
    )
    .await
    .context("cannot connect to the Docker engine")?;
    Ok(Arc::new(runtime))
}

/// Loads a fixture file as the runtime.
pub fn fixture_runtime(path: &Path) -> anyhow::Result<Arc<dyn ContainerRuntime>> {
    let runtime = FixtureRuntime::from_file(path).map_err(anyhow::Error::msg)?;
    Ok(Arc::new(runtime))
}

/// Compiles the label templates, checks the allow-list against the current
/// inventory and builds the collector.
pub async fn build_collector(
    config: &Config,
    runtime: Arc<dyn ContainerRuntime>,
) -> anyhow::Result<Collector> {
    let labels =
        LabelResolver::compile(&config.labels).context("invalid label template")?;
    debug!("Compiled {} label templates", config.labels.len());

    let inventory = runtime
        .list_containers()
        .await
        .context("cannot list containers")?;
    let filter = ServiceFilter::new(&config.services, config.collect_all(), &inventory)?;

    info!("Inventory at startup: {} containers", inventory.len());

    Ok(Collector::new(
        runtime,
        filter,
        labels,
        config.collector_options(),
    ))
}

/// Parses a `--label NAME=TEMPLATE` argument.
pub fn parse_label_arg(raw: &str) -> anyhow::Result<(String, String)> {
    match raw.split_once('=') {
        Some((name, template)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), template.to_string()))
        }
        _ => anyhow::bail!("invalid --label '{}', expected NAME=TEMPLATE", raw),
    }
}
