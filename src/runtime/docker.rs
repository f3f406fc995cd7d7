//! Docker Engine adapter built on `bollard`.

use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, ListContainersOptions, StatsOptions};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, info};

use super::{ContainerRecord, ContainerRuntime, ResourceSnapshot, RuntimeError};

/// Seconds the HTTP client waits on the engine before giving up a request.
const CLIENT_TIMEOUT_SECS: u64 = 120;

/// [`ContainerRuntime`] backed by the Docker Engine API.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
    with_sizes: bool,
}

impl DockerRuntime {
    /// Connects to the engine and negotiates the API version.
    ///
    /// `host` accepts `unix:///path`, a bare socket path, `tcp://host:port`
    /// or `http://host:port`; `None` uses the local defaults (`DOCKER_HOST`
    /// or the standard socket). With `with_sizes` the inventory carries
    /// writable-layer and rootfs sizes, which is expensive on large hosts.
    pub async fn connect(host: Option<&str>, with_sizes: bool) -> Result<Self, RuntimeError> {
        let docker = match host {
            Some(h) if h.starts_with("tcp://") || h.starts_with("http://") => {
                let url = h.replacen("tcp://", "http://", 1);
                Docker::connect_with_http(&url, CLIENT_TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
            Some(h) => {
                let path = h.strip_prefix("unix://").unwrap_or(h);
                Docker::connect_with_socket(path, CLIENT_TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(|e| RuntimeError::Connect(Box::new(e)))?;

        let docker = docker
            .negotiate_version()
            .await
            .map_err(|e| RuntimeError::Connect(Box::new(e)))?;

        info!(
            "Connected to Docker engine at {}",
            host.unwrap_or("local default socket")
        );

        Ok(Self { docker, with_sizes })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerRecord>, RuntimeError> {
        let options = ListContainersOptions::<String> {
            all: true,
            size: self.with_sizes,
            ..Default::default()
        };

        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| RuntimeError::List(Box::new(e)))?;

        debug!("Engine reported {} containers", summaries.len());

        summaries
            .into_iter()
            .map(|summary| {
                let value = serde_json::to_value(&summary).map_err(|source| {
                    RuntimeError::Decode {
                        what: "container summary",
                        source,
                    }
                })?;
                ContainerRecord::from_summary(value)
            })
            .collect()
    }

    async fn inspect_container(&self, id: &str) -> Result<Value, RuntimeError> {
        let detail = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| RuntimeError::Inspect {
                id: id.to_string(),
                source: Box::new(e),
            })?;

        serde_json::to_value(&detail).map_err(|source| RuntimeError::Decode {
            what: "container inspection",
            source,
        })
    }

    async fn container_stats(&self, id: &str) -> Result<ResourceSnapshot, RuntimeError> {
        let options = StatsOptions {
            stream: false,
            one_shot: true,
        };
        let mut stream = Box::pin(self.docker.stats(id, Some(options)));

        let stats = match stream.next().await {
            Some(Ok(stats)) => stats,
            Some(Err(e)) => {
                return Err(RuntimeError::Stats {
                    id: id.to_string(),
                    source: Box::new(e),
                })
            }
            None => return Err(RuntimeError::EmptyStats { id: id.to_string() }),
        };

        // Re-read through the engine's wire names so the memory sub-counters
        // keep whatever keys this cgroup version reports.
        let value = serde_json::to_value(&stats).map_err(|source| RuntimeError::Decode {
            what: "container stats",
            source,
        })?;
        ResourceSnapshot::from_stats_json(value)
    }
}
