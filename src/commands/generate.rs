//! Generate-fixture command implementation.
//!
//! Writes a synthetic fleet in the fixture format read by
//! `FixtureRuntime::from_file`, so scrapes can be exercised without a
//! Docker engine.

use anyhow::Context;
use chrono::Utc;
use rand::Rng;
use serde_json::{json, Value};
use services_metrics_exporter::collector::memory::{CGROUP_V1_CACHE_KEY, CGROUP_V2_CACHE_KEY};
use services_metrics_exporter::runtime::fixture::{FixtureContainer, FixtureData};
use services_metrics_exporter::Config;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

const MB: u64 = 1024 * 1024;

/// Generates a synthetic fixture file.
pub fn command_generate_fixture(
    output: PathBuf,
    running: usize,
    stopped: usize,
    config: &Config,
) -> anyhow::Result<()> {
    debug!(
        "Generating fixture: running={}, stopped={}, output={}",
        running,
        stopped,
        output.display()
    );

    let mut rng = rand::thread_rng();
    let mut containers = Vec::with_capacity(running + stopped);

    // Configured service names come first so the fixture passes the filter.
    let names: Vec<String> = config
        .services
        .iter()
        .filter(|s| !s.trim().is_empty())
        .cloned()
        .chain((1..).map(|i| format!("service-{i}")))
        .take(running + stopped)
        .collect();

    for (i, name) in names.into_iter().enumerate() {
        let state = if i < running { "running" } else { "exited" };
        let mut container = FixtureContainer::new(random_id(&mut rng), name, state)
            .with_label("com.docker.compose.project", "fixture")
            .with_label(
                "com.docker.compose.service",
                format!("svc{}", i % 4),
            );
        container.image = format!("registry.local/app-{}:latest", i % 4);
        if i < running {
            container = container.with_stats(random_stats(&mut rng));
        }
        containers.push(container);
    }

    let data = FixtureData {
        version: "1.0".to_string(),
        generated_at: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        containers,
    };

    let json_content = serde_json::to_string_pretty(&data)?;
    fs::write(&output, &json_content)
        .with_context(|| format!("cannot write {}", output.display()))?;

    println!(
        "✅ Generated fixture: {} containers in {}",
        data.containers.len(),
        output.display()
    );

    Ok(())
}

fn random_id(rng: &mut impl Rng) -> String {
    (0..32).map(|_| format!("{:02x}", rng.gen::<u8>())).collect()
}

/// A Docker-shaped stats document with plausible values.
fn random_stats(rng: &mut impl Rng) -> Value {
    // Usage: 16 MB - 2 GB, cache up to half of it
    let usage = rng.gen_range(16 * MB..2048 * MB);
    let cache = rng.gen_range(0..usage / 2);
    let limit = if rng.gen_bool(0.5) { 4096 * MB } else { 0 };
    let cache_key = if rng.gen_bool(0.5) {
        CGROUP_V1_CACHE_KEY
    } else {
        CGROUP_V2_CACHE_KEY
    };
    let mut counters = serde_json::Map::new();
    counters.insert(cache_key.to_string(), json!(cache));

    json!({
        "cpu_stats": {"cpu_usage": {"total_usage": rng.gen_range(0..10_000u64) * 1_000_000_000}},
        "memory_stats": {
            "usage": usage,
            "limit": limit,
            "stats": counters
        },
        "networks": {
            "eth0": {
                "rx_bytes": rng.gen_range(0..10_000 * MB),
                "tx_bytes": rng.gen_range(0..10_000 * MB)
            }
        },
        "blkio_stats": {
            "io_service_bytes_recursive": [
                {"major": 8, "minor": 0, "op": "read", "value": rng.gen_range(0..5_000 * MB)},
                {"major": 8, "minor": 0, "op": "write", "value": rng.gen_range(0..5_000 * MB)}
            ]
        },
        "pids_stats": {"current": rng.gen_range(1..200u64)}
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use services_metrics_exporter::runtime::{ContainerRuntime, FixtureRuntime};

    #[tokio::test]
    async fn test_generated_fixture_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.json");
        let config = Config {
            services: vec!["api".into()],
            ..Default::default()
        };

        command_generate_fixture(path.clone(), 3, 2, &config).unwrap();

        let runtime = FixtureRuntime::from_file(&path).unwrap();
        let inventory = runtime.list_containers().await.unwrap();
        assert_eq!(inventory.len(), 5);
        assert_eq!(inventory[0].name, "api");
        assert_eq!(inventory.iter().filter(|c| c.state.is_running()).count(), 3);

        let stats = runtime.container_stats(&inventory[0].id).await.unwrap();
        assert!(stats.memory_usage >= 16 * MB);
    }
}
