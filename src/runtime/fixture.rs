//! In-memory container runtime driven by fixture data.
//!
//! Used by the `test --fixture` dry run, by `generate-fixture`, and by the
//! collector tests. Containers carry Docker-shaped stats documents so the
//! decode path is exercised exactly as with a live engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use super::{ContainerRecord, ContainerRuntime, ResourceSnapshot, RuntimeError};

/// One container in a fixture file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureContainer {
    pub id: String,
    pub name: String,
    pub state: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Docker stats document returned for this container.
    #[serde(default)]
    pub stats: Option<Value>,
    #[serde(default)]
    pub size_rw: Option<u64>,
    #[serde(default)]
    pub size_root_fs: Option<u64>,
    /// Healthcheck status; containers without a healthcheck have no
    /// `State.Health` in their inspection.
    #[serde(default)]
    pub health: Option<String>,
    /// Makes the stats call fail, simulating a broken container.
    #[serde(default)]
    pub fail_stats: bool,
    /// Delays the stats call, simulating a slow container.
    #[serde(default)]
    pub stats_delay_ms: Option<u64>,
}

impl FixtureContainer {
    pub fn new(id: impl Into<String>, name: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state: state.into(),
            image: String::new(),
            labels: BTreeMap::new(),
            stats: None,
            size_rw: None,
            size_root_fs: None,
            health: None,
            fail_stats: false,
            stats_delay_ms: None,
        }
    }

    /// Attaches a minimal stats document with the given memory figures.
    pub fn with_memory(mut self, usage: u64, limit: u64, counters: &[(&str, u64)]) -> Self {
        let counters: BTreeMap<&str, u64> = counters.iter().copied().collect();
        self.stats = Some(json!({
            "cpu_stats": {"cpu_usage": {"total_usage": 0}},
            "memory_stats": {"usage": usage, "limit": limit, "stats": counters},
            "pids_stats": {"current": 1}
        }));
        self
    }

    pub fn with_stats(mut self, stats: Value) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_health(mut self, status: impl Into<String>) -> Self {
        self.health = Some(status.into());
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_stats = true;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.stats_delay_ms = Some(delay.as_millis() as u64);
        self
    }

    fn summary(&self) -> Value {
        let mut summary = json!({
            "Id": self.id,
            "Names": [format!("/{}", self.name)],
            "Image": self.image,
            "State": self.state,
            "Labels": self.labels,
        });
        if let Some(size) = self.size_rw {
            summary["SizeRw"] = json!(size);
        }
        if let Some(size) = self.size_root_fs {
            summary["SizeRootFs"] = json!(size);
        }
        summary
    }

    fn inspection(&self) -> Value {
        let mut inspection = json!({
            "Id": self.id,
            "Name": format!("/{}", self.name),
            "State": {"Status": self.state, "Running": self.state == "running"},
            "Config": {"Image": self.image, "Labels": self.labels},
        });
        if let Some(status) = &self.health {
            inspection["State"]["Health"] = json!({"Status": status});
        }
        inspection
    }
}

/// Root structure of a fixture file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureData {
    pub version: String,
    pub generated_at: String,
    pub containers: Vec<FixtureContainer>,
}

/// [`ContainerRuntime`] serving a fixed set of containers.
#[derive(Debug, Default)]
pub struct FixtureRuntime {
    containers: Vec<FixtureContainer>,
    fail_listing: AtomicBool,
}

impl FixtureRuntime {
    pub fn new(containers: Vec<FixtureContainer>) -> Self {
        Self {
            containers,
            fail_listing: AtomicBool::new(false),
        }
    }

    /// Loads a fixture file written by `generate-fixture`.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        debug!("Loading fixture data from: {}", path.display());

        if !path.exists() {
            return Err(format!("Fixture file not found: {}", path.display()));
        }

        let content =
            fs::read_to_string(path).map_err(|e| format!("Failed to read fixture file: {}", e))?;
        let data: FixtureData = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse fixture JSON: {}", e))?;

        info!(
            "Loaded fixture version {} ({} containers) generated at {}",
            data.version,
            data.containers.len(),
            data.generated_at
        );

        Ok(Self::new(data.containers))
    }

    /// Makes subsequent inventory calls fail (or succeed again).
    pub fn set_listing_fails(&self, fails: bool) {
        self.fail_listing.store(fails, Ordering::SeqCst);
    }

    fn find(&self, id: &str) -> Option<&FixtureContainer> {
        self.containers.iter().find(|c| c.id == id)
    }
}

#[async_trait]
impl ContainerRuntime for FixtureRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerRecord>, RuntimeError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(RuntimeError::List("fixture inventory unavailable".into()));
        }
        self.containers
            .iter()
            .map(|c| ContainerRecord::from_summary(c.summary()))
            .collect()
    }

    async fn inspect_container(&self, id: &str) -> Result<Value, RuntimeError> {
        self.find(id)
            .map(FixtureContainer::inspection)
            .ok_or_else(|| RuntimeError::Inspect {
                id: id.to_string(),
                source: "no such container".into(),
            })
    }

    async fn container_stats(&self, id: &str) -> Result<ResourceSnapshot, RuntimeError> {
        let container = self.find(id).ok_or_else(|| RuntimeError::Stats {
            id: id.to_string(),
            source: "no such container".into(),
        })?;

        if let Some(ms) = container.stats_delay_ms {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        if container.fail_stats {
            return Err(RuntimeError::Stats {
                id: id.to_string(),
                source: "simulated stats failure".into(),
            });
        }

        let stats = container
            .stats
            .clone()
            .ok_or_else(|| RuntimeError::EmptyStats { id: id.to_string() })?;
        ResourceSnapshot::from_stats_json(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_listing_reflects_fixture() {
        let runtime = FixtureRuntime::new(vec![
            FixtureContainer::new("a1", "api", "running"),
            FixtureContainer::new("b2", "db", "exited"),
        ]);

        let records = runtime.list_containers().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "api");
        assert!(records[0].state.is_running());
        assert!(!records[1].state.is_running());

        runtime.set_listing_fails(true);
        assert!(runtime.list_containers().await.is_err());
    }

    #[tokio::test]
    async fn test_stats_failures_are_reported() {
        let runtime = FixtureRuntime::new(vec![
            FixtureContainer::new("a1", "api", "running").failing(),
            FixtureContainer::new("b2", "db", "running"),
        ]);

        assert!(matches!(
            runtime.container_stats("a1").await,
            Err(RuntimeError::Stats { .. })
        ));
        assert!(matches!(
            runtime.container_stats("b2").await,
            Err(RuntimeError::EmptyStats { .. })
        ));
    }

    #[test]
    fn test_from_file() {
        let data = FixtureData {
            version: "1.0".into(),
            generated_at: "2026-01-01T00:00:00Z".into(),
            containers: vec![FixtureContainer::new("a1", "api", "running").with_memory(10, 20, &[])],
        };
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&data).unwrap().as_bytes())
            .unwrap();

        let runtime = FixtureRuntime::from_file(file.path()).unwrap();
        assert_eq!(runtime.containers.len(), 1);

        assert!(FixtureRuntime::from_file(Path::new("/nonexistent/fixture.json")).is_err());
    }
}
