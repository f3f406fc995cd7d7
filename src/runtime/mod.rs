//! Container runtime boundary.
//!
//! This module defines the [`ContainerRuntime`] trait the collector talks to,
//! the records it returns, and the decoding of the runtime's stats payload
//! into a [`ResourceSnapshot`]. The Docker adapter lives in [`docker`]; an
//! in-memory runtime driven by fixtures lives in [`fixture`].

use ahash::AHashMap as HashMap;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

pub mod docker;
pub mod fixture;

pub use docker::DockerRuntime;
pub use fixture::{FixtureContainer, FixtureRuntime};

/// Boxed error coming from a runtime client library.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by a [`ContainerRuntime`].
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("cannot connect to container runtime: {0}")]
    Connect(#[source] BoxError),

    #[error("cannot list containers: {0}")]
    List(#[source] BoxError),

    #[error("cannot inspect container {id}: {source}")]
    Inspect {
        id: String,
        #[source]
        source: BoxError,
    },

    #[error("cannot get stats for container {id}: {source}")]
    Stats {
        id: String,
        #[source]
        source: BoxError,
    },

    #[error("stats for container {id} ended without a sample")]
    EmptyStats { id: String },

    #[error("cannot decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("container summary has no {0}")]
    MissingField(&'static str),
}

/// Read-only access to the container runtime.
///
/// Implementations are shared across every collection task of a scrape, so
/// they must be cheap to call concurrently.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Lists every container, running or not.
    async fn list_containers(&self) -> Result<Vec<ContainerRecord>, RuntimeError>;

    /// Returns the full inspection payload of one container.
    async fn inspect_container(&self, id: &str) -> Result<Value, RuntimeError>;

    /// Returns one point-in-time stats sample (never a stream).
    async fn container_stats(&self, id: &str) -> Result<ResourceSnapshot, RuntimeError>;
}

/// Lifecycle state reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    Other(String),
}

impl ContainerState {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "removing" => Self::Removing,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            _ => Self::Other(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::Removing => "removing",
            Self::Exited => "exited",
            Self::Dead => "dead",
            Self::Other(raw) => raw,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One container as seen in the current inventory.
#[derive(Debug, Clone)]
pub struct ContainerRecord {
    pub id: String,
    /// Display name with the runtime's leading `/` stripped.
    pub name: String,
    pub state: ContainerState,
    /// Size of the writable layer, only when the runtime was asked for sizes.
    pub size_rw: Option<u64>,
    pub size_root_fs: Option<u64>,
    /// Raw summary payload, used as template context.
    pub summary: Value,
}

impl ContainerRecord {
    /// Builds a record from a Docker-style container summary
    /// (`{"Id": .., "Names": ["/foo"], "State": "running", ...}`).
    pub fn from_summary(summary: Value) -> Result<Self, RuntimeError> {
        let id = summary
            .get("Id")
            .and_then(Value::as_str)
            .ok_or(RuntimeError::MissingField("Id"))?
            .to_string();

        let name = summary
            .get("Names")
            .and_then(Value::as_array)
            .and_then(|names| names.first())
            .and_then(Value::as_str)
            .map(display_name)
            .unwrap_or_else(|| id.chars().take(12).collect());

        let state = summary
            .get("State")
            .and_then(Value::as_str)
            .map(ContainerState::parse)
            .ok_or(RuntimeError::MissingField("State"))?;

        let size = |key: &str| {
            summary
                .get(key)
                .and_then(Value::as_i64)
                .and_then(|v| u64::try_from(v).ok())
        };
        let size_rw = size("SizeRw");
        let size_root_fs = size("SizeRootFs");

        Ok(Self {
            id,
            name,
            state,
            size_rw,
            size_root_fs,
            summary,
        })
    }
}

/// Strips the leading separator(s) from a runtime container name.
pub fn display_name(raw: &str) -> String {
    raw.trim_matches('/').to_string()
}

/// Received/transmitted byte counters of one network interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// One block-I/O accounting entry (`op` is `read`, `write`, `sync`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlkioEntry {
    pub op: String,
    pub value: u64,
}

/// Point-in-time resource usage of one container.
#[derive(Debug, Clone, Default)]
pub struct ResourceSnapshot {
    /// Cumulative CPU time since container start, in nanoseconds.
    pub cpu_total_ns: u64,
    pub memory_usage: u64,
    pub memory_limit: u64,
    /// Memory accounting sub-counters; the key set depends on the cgroup version.
    pub memory_stats: HashMap<String, u64>,
    pub networks: HashMap<String, NetworkCounters>,
    pub blkio: Vec<BlkioEntry>,
    pub pids: u64,
    pub disk_usage: Option<u64>,
    pub disk_size_rootfs: Option<u64>,
}

impl ResourceSnapshot {
    /// Decodes a Docker Engine stats document.
    pub fn from_stats_json(value: Value) -> Result<Self, RuntimeError> {
        let raw: RawStats = serde_json::from_value(value).map_err(|source| RuntimeError::Decode {
            what: "container stats",
            source,
        })?;

        let cpu_total_ns = raw
            .cpu_stats
            .and_then(|cpu| cpu.cpu_usage)
            .and_then(|usage| usage.total_usage)
            .unwrap_or(0);

        let memory = raw.memory_stats.unwrap_or_default();
        let memory_stats = memory
            .stats
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(key, value)| value.as_u64().map(|v| (key, v)))
            .collect();

        let networks = raw
            .networks
            .unwrap_or_default()
            .into_iter()
            .map(|(iface, net)| {
                (
                    iface,
                    NetworkCounters {
                        rx_bytes: net.rx_bytes.unwrap_or(0),
                        tx_bytes: net.tx_bytes.unwrap_or(0),
                    },
                )
            })
            .collect();

        let blkio = raw
            .blkio_stats
            .and_then(|b| b.io_service_bytes_recursive)
            .unwrap_or_default()
            .into_iter()
            .map(|e| BlkioEntry {
                op: e.op,
                value: e.value,
            })
            .collect();

        let pids = raw.pids_stats.and_then(|p| p.current).unwrap_or(0);

        Ok(Self {
            cpu_total_ns,
            memory_usage: memory.usage.unwrap_or(0),
            memory_limit: memory.limit.unwrap_or(0),
            memory_stats,
            networks,
            blkio,
            pids,
            disk_usage: None,
            disk_size_rootfs: None,
        })
    }
}

// Wire shape of the Docker stats document. Every section is optional because
// the engine omits whole sections depending on platform and cgroup version.

#[derive(Debug, Default, Deserialize)]
struct RawStats {
    cpu_stats: Option<RawCpuStats>,
    memory_stats: Option<RawMemoryStats>,
    networks: Option<std::collections::HashMap<String, RawNetwork>>,
    blkio_stats: Option<RawBlkioStats>,
    pids_stats: Option<RawPidsStats>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCpuStats {
    cpu_usage: Option<RawCpuUsage>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCpuUsage {
    total_usage: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMemoryStats {
    usage: Option<u64>,
    limit: Option<u64>,
    stats: Option<std::collections::HashMap<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawNetwork {
    rx_bytes: Option<u64>,
    tx_bytes: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawBlkioStats {
    io_service_bytes_recursive: Option<Vec<RawBlkioEntry>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawBlkioEntry {
    #[serde(default)]
    op: String,
    #[serde(default)]
    value: u64,
}

#[derive(Debug, Default, Deserialize)]
struct RawPidsStats {
    current: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_parse_round_trips_known_states() {
        assert_eq!(ContainerState::parse("running"), ContainerState::Running);
        assert_eq!(ContainerState::parse("Exited"), ContainerState::Exited);
        assert!(ContainerState::parse("running").is_running());
        assert!(!ContainerState::parse("paused").is_running());

        let odd = ContainerState::parse("zombie");
        assert_eq!(odd.as_str(), "zombie");
    }

    #[test]
    fn test_record_from_summary_strips_separator() {
        let record = ContainerRecord::from_summary(json!({
            "Id": "0123456789abcdef",
            "Names": ["/web"],
            "State": "running",
            "SizeRw": 4096,
            "SizeRootFs": 1048576
        }))
        .unwrap();

        assert_eq!(record.name, "web");
        assert_eq!(record.state, ContainerState::Running);
        assert_eq!(record.size_rw, Some(4096));
        assert_eq!(record.size_root_fs, Some(1048576));
    }

    #[test]
    fn test_record_without_names_falls_back_to_short_id() {
        let record = ContainerRecord::from_summary(json!({
            "Id": "0123456789abcdef",
            "State": "exited"
        }))
        .unwrap();
        assert_eq!(record.name, "0123456789ab");
        assert_eq!(record.size_rw, None);
    }

    #[test]
    fn test_record_requires_id_and_state() {
        assert!(ContainerRecord::from_summary(json!({"Names": ["/a"], "State": "running"})).is_err());
        assert!(ContainerRecord::from_summary(json!({"Id": "x", "Names": ["/a"]})).is_err());
    }

    #[test]
    fn test_decode_cgroup_v1_stats() {
        let snapshot = ResourceSnapshot::from_stats_json(json!({
            "cpu_stats": {"cpu_usage": {"total_usage": 2_500_000_000u64}},
            "memory_stats": {
                "usage": 300,
                "limit": 1000,
                "stats": {"total_inactive_file": 50, "cache": 70}
            },
            "networks": {
                "eth0": {"rx_bytes": 10, "tx_bytes": 20},
                "eth1": {"rx_bytes": 1, "tx_bytes": 2}
            },
            "blkio_stats": {"io_service_bytes_recursive": [
                {"major": 8, "minor": 0, "op": "Read", "value": 100},
                {"major": 8, "minor": 0, "op": "Write", "value": 200}
            ]},
            "pids_stats": {"current": 7}
        }))
        .unwrap();

        assert_eq!(snapshot.cpu_total_ns, 2_500_000_000);
        assert_eq!(snapshot.memory_usage, 300);
        assert_eq!(snapshot.memory_limit, 1000);
        assert_eq!(snapshot.memory_stats.get("total_inactive_file"), Some(&50));
        assert_eq!(snapshot.networks.len(), 2);
        assert_eq!(snapshot.blkio.len(), 2);
        assert_eq!(snapshot.pids, 7);
    }

    #[test]
    fn test_decode_tolerates_missing_sections() {
        // cgroup v2 engines report null blkio lists and no networks for host-mode containers
        let snapshot = ResourceSnapshot::from_stats_json(json!({
            "memory_stats": {"usage": 10, "stats": {"inactive_file": 4}},
            "blkio_stats": {"io_service_bytes_recursive": null}
        }))
        .unwrap();

        assert_eq!(snapshot.cpu_total_ns, 0);
        assert!(snapshot.networks.is_empty());
        assert!(snapshot.blkio.is_empty());
        assert_eq!(snapshot.memory_stats.get("inactive_file"), Some(&4));
    }

    #[test]
    fn test_decode_rejects_malformed_payload() {
        let err = ResourceSnapshot::from_stats_json(json!({"memory_stats": {"usage": "lots"}}));
        assert!(matches!(err, Err(RuntimeError::Decode { .. })));
    }
}
