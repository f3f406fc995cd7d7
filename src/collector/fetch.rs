//! Per-container collection task.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use super::aggregate::CycleTotal;
use super::labels::{LabelError, LabelResolver};
use super::memory::effective_memory;
use crate::metrics::{self, MetricDef, MetricSample};
use crate::runtime::{ContainerRecord, ContainerRuntime, ResourceSnapshot, RuntimeError};

/// Nanoseconds per second, for CPU time conversion.
const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// A failure confined to one container for one cycle.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Label(#[from] LabelError),

    #[error("runtime did not answer within {0:?}")]
    Timeout(Duration),
}

/// Shared, read-only inputs of every task in a cycle.
#[derive(Clone)]
pub(crate) struct TaskContext {
    pub runtime: Arc<dyn ContainerRuntime>,
    pub labels: Arc<LabelResolver>,
    pub label_names: Arc<[String]>,
    pub total: CycleTotal,
    pub deadline: Duration,
}

/// What one task hands back to the assembler.
#[derive(Debug, Default)]
pub struct ContainerOutcome {
    pub samples: Vec<MetricSample>,
    pub failed: bool,
}

/// Collects one container: labels, info sample, and for running containers
/// the resource samples. Errors are logged here and never propagate.
pub(crate) async fn collect_container(ctx: &TaskContext, record: ContainerRecord) -> ContainerOutcome {
    let deadline = Instant::now() + ctx.deadline;
    let mut samples = Vec::new();

    match collect_into(ctx, &record, deadline, &mut samples).await {
        Ok(()) => ContainerOutcome {
            samples,
            failed: false,
        },
        Err(e) => {
            warn!(
                container = %record.name,
                id = %record.id,
                "Skipping container metrics for this scrape: {}",
                e
            );
            ContainerOutcome {
                samples,
                failed: true,
            }
        }
    }
}

async fn collect_into(
    ctx: &TaskContext,
    record: &ContainerRecord,
    deadline: Instant,
    samples: &mut Vec<MetricSample>,
) -> Result<(), CollectError> {
    let mut label_values = vec![record.name.clone(), record.state.to_string()];

    if !ctx.labels.is_empty() {
        let inspection = timeout_at(deadline, ctx.runtime.inspect_container(&record.id))
            .await
            .map_err(|_| CollectError::Timeout(ctx.deadline))??;
        label_values.extend(ctx.labels.resolve(record, &inspection)?);
    }

    samples.push(MetricSample::new(
        &metrics::CONTAINER_INFO,
        ctx.label_names.clone(),
        label_values.clone(),
        1.0,
    ));

    if !record.state.is_running() {
        debug!("Container {} is {}, reporting presence only", record.name, record.state);
        return Ok(());
    }

    let mut snapshot = timeout_at(deadline, ctx.runtime.container_stats(&record.id))
        .await
        .map_err(|_| CollectError::Timeout(ctx.deadline))??;
    snapshot.disk_usage = snapshot.disk_usage.or(record.size_rw);
    snapshot.disk_size_rootfs = snapshot.disk_size_rootfs.or(record.size_root_fs);

    let effective = effective_memory(&snapshot);
    ctx.total.add(effective);

    samples.extend(resource_samples(
        &snapshot,
        effective,
        &ctx.label_names,
        &label_values,
    ));
    Ok(())
}

/// Resource samples of one running container.
pub fn resource_samples(
    snapshot: &ResourceSnapshot,
    effective_memory: u64,
    label_names: &Arc<[String]>,
    label_values: &[String],
) -> Vec<MetricSample> {
    let sample = |def: &'static MetricDef, value: f64| {
        MetricSample::new(def, label_names.clone(), label_values.to_vec(), value)
    };

    let (rx_bytes, tx_bytes) = snapshot
        .networks
        .values()
        .fold((0u64, 0u64), |(rx, tx), n| {
            (rx.saturating_add(n.rx_bytes), tx.saturating_add(n.tx_bytes))
        });

    let mut read_bytes = 0u64;
    let mut write_bytes = 0u64;
    for entry in &snapshot.blkio {
        // cgroup v1 engines report "Read"/"Write", v2 engines "read"/"write"
        if entry.op.eq_ignore_ascii_case("read") {
            read_bytes = read_bytes.saturating_add(entry.value);
        } else if entry.op.eq_ignore_ascii_case("write") {
            write_bytes = write_bytes.saturating_add(entry.value);
        }
    }

    let mut out = vec![
        sample(&metrics::CPU_SECONDS, snapshot.cpu_total_ns as f64 / NANOS_PER_SEC),
        sample(&metrics::MEMORY_USAGE, effective_memory as f64),
        sample(&metrics::MEMORY_LIMIT, snapshot.memory_limit as f64),
        sample(&metrics::NETWORK_RX, rx_bytes as f64),
        sample(&metrics::NETWORK_TX, tx_bytes as f64),
        sample(&metrics::BLKIO_READ, read_bytes as f64),
        sample(&metrics::BLKIO_WRITE, write_bytes as f64),
        sample(&metrics::PIDS, snapshot.pids as f64),
    ];

    if let Some(size) = snapshot.disk_usage {
        out.push(sample(&metrics::DISK_USAGE, size as f64));
    }
    if let Some(size) = snapshot.disk_size_rootfs {
        out.push(sample(&metrics::DISK_SIZE_ROOTFS, size as f64));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{BlkioEntry, NetworkCounters};

    fn names() -> Arc<[String]> {
        Arc::from(vec!["name".to_string(), "state".to_string()])
    }

    fn values() -> Vec<String> {
        vec!["api".to_string(), "running".to_string()]
    }

    fn value_of(samples: &[MetricSample], def: &MetricDef) -> Option<f64> {
        samples.iter().find(|s| s.def == def).map(|s| s.value)
    }

    #[test]
    fn test_resource_samples_sum_interfaces_and_devices() {
        let mut snapshot = ResourceSnapshot {
            cpu_total_ns: 1_500_000_000,
            memory_usage: 500,
            memory_limit: 2048,
            pids: 12,
            ..Default::default()
        };
        snapshot.networks.insert(
            "eth0".into(),
            NetworkCounters {
                rx_bytes: 100,
                tx_bytes: 10,
            },
        );
        snapshot.networks.insert(
            "eth1".into(),
            NetworkCounters {
                rx_bytes: 50,
                tx_bytes: 5,
            },
        );
        snapshot.blkio = vec![
            BlkioEntry { op: "Read".into(), value: 30 },
            BlkioEntry { op: "read".into(), value: 12 },
            BlkioEntry { op: "Write".into(), value: 7 },
            BlkioEntry { op: "Sync".into(), value: 1000 },
        ];

        let samples = resource_samples(&snapshot, 400, &names(), &values());

        assert_eq!(value_of(&samples, &metrics::CPU_SECONDS), Some(1.5));
        assert_eq!(value_of(&samples, &metrics::MEMORY_USAGE), Some(400.0));
        assert_eq!(value_of(&samples, &metrics::MEMORY_LIMIT), Some(2048.0));
        assert_eq!(value_of(&samples, &metrics::NETWORK_RX), Some(150.0));
        assert_eq!(value_of(&samples, &metrics::NETWORK_TX), Some(15.0));
        assert_eq!(value_of(&samples, &metrics::BLKIO_READ), Some(42.0));
        assert_eq!(value_of(&samples, &metrics::BLKIO_WRITE), Some(7.0));
        assert_eq!(value_of(&samples, &metrics::PIDS), Some(12.0));
        assert_eq!(value_of(&samples, &metrics::DISK_USAGE), None);
        assert!(samples.iter().all(|s| s.label("name") == Some("api")));
    }

    #[test]
    fn test_disk_samples_only_when_reported() {
        let snapshot = ResourceSnapshot {
            disk_usage: Some(4096),
            disk_size_rootfs: Some(1 << 20),
            ..Default::default()
        };
        let samples = resource_samples(&snapshot, 0, &names(), &values());
        assert_eq!(value_of(&samples, &metrics::DISK_USAGE), Some(4096.0));
        assert_eq!(value_of(&samples, &metrics::DISK_SIZE_ROOTFS), Some(1048576.0));
    }
}
