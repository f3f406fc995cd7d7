//! Scrape orchestration.
//!
//! One [`Collector::scrape`] call is one scrape cycle: list the inventory,
//! keep the containers the [`ServiceFilter`] allows, run one collection task
//! per container (bounded by `max_concurrency`, each under its own
//! deadline), join them all, then read the cycle's memory total.

pub mod aggregate;
pub mod fetch;
pub mod filter;
pub mod labels;
pub mod memory;

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::metrics::{self, MetricDef, MetricSample};
use crate::runtime::{ContainerRuntime, RuntimeError};

pub use aggregate::{CycleTotal, TotalMemory};
pub use fetch::{CollectError, ContainerOutcome};
pub use filter::{FilterError, ServiceFilter};
pub use labels::{LabelError, LabelResolver, TemplateError};

/// Default upper bound on concurrently running collection tasks.
pub const DEFAULT_MAX_CONCURRENCY: usize = 32;
/// Default per-container deadline for runtime calls.
pub const DEFAULT_STATS_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct CollectorOptions {
    pub max_concurrency: usize,
    pub stats_timeout: Duration,
    /// Emit the exporter's own scrape duration and failure count.
    pub telemetry: bool,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            stats_timeout: DEFAULT_STATS_TIMEOUT,
            telemetry: true,
        }
    }
}

/// The whole scrape failed; no samples are produced for this cycle.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("cannot list containers: {0}")]
    Inventory(#[source] RuntimeError),
}

/// Result of one scrape cycle.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub samples: Vec<MetricSample>,
    pub containers_listed: usize,
    pub containers_in_scope: usize,
    pub containers_failed: usize,
    pub total_memory: u64,
    pub duration: Duration,
}

impl Snapshot {
    /// Value of `def` for the container called `name`.
    pub fn value_for(&self, def: &MetricDef, name: &str) -> Option<f64> {
        self.samples
            .iter()
            .find(|s| s.def == def && s.label("name") == Some(name))
            .map(|s| s.value)
    }

    /// Every sample of one family.
    pub fn family<'a>(&'a self, def: &'a MetricDef) -> impl Iterator<Item = &'a MetricSample> + 'a {
        self.samples.iter().filter(move |s| s.def == def)
    }
}

/// Runs scrape cycles against one container runtime.
pub struct Collector {
    runtime: Arc<dyn ContainerRuntime>,
    filter: ServiceFilter,
    labels: Arc<LabelResolver>,
    label_names: Arc<[String]>,
    total: Arc<TotalMemory>,
    options: CollectorOptions,
}

impl Collector {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        filter: ServiceFilter,
        labels: LabelResolver,
        options: CollectorOptions,
    ) -> Self {
        let label_names: Arc<[String]> = Arc::from(labels.label_names());
        Self {
            runtime,
            filter,
            labels: Arc::new(labels),
            label_names,
            total: Arc::new(TotalMemory::new()),
            options,
        }
    }

    pub fn options(&self) -> &CollectorOptions {
        &self.options
    }

    pub fn filter(&self) -> &ServiceFilter {
        &self.filter
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    /// Runs one full scrape cycle.
    pub async fn scrape(&self) -> Result<Snapshot, ScrapeError> {
        let start = Instant::now();
        // Held until the end of the cycle; concurrent scrapes queue here.
        let cycle = self.total.begin_cycle().await;

        let inventory = self.runtime.list_containers().await.map_err(|e| {
            error!("Scrape aborted, cannot list containers: {}", e);
            ScrapeError::Inventory(e)
        })?;
        let containers_listed = inventory.len();

        let in_scope: Vec<_> = inventory
            .into_iter()
            .filter(|c| self.filter.includes(&c.name))
            .collect();
        let containers_in_scope = in_scope.len();
        debug!(
            "Collecting {} of {} containers",
            containers_in_scope, containers_listed
        );

        let permits = Arc::new(Semaphore::new(self.options.max_concurrency.max(1)));
        let ctx = fetch::TaskContext {
            runtime: self.runtime.clone(),
            labels: self.labels.clone(),
            label_names: self.label_names.clone(),
            total: cycle.total(),
            deadline: self.options.stats_timeout,
        };

        let mut tasks = JoinSet::new();
        for record in in_scope {
            let ctx = ctx.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                fetch::collect_container(&ctx, record).await
            });
        }

        let mut samples = Vec::new();
        let mut containers_failed = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    if outcome.failed {
                        containers_failed += 1;
                    }
                    samples.extend(outcome.samples);
                }
                Err(e) => {
                    containers_failed += 1;
                    error!("Container collection task did not complete: {}", e);
                }
            }
        }

        // Every task has been joined; the total is complete for this cycle.
        let total_memory = cycle.finish();
        samples.push(MetricSample::unlabeled(
            &metrics::TOTAL_MEMORY_USAGE,
            total_memory as f64,
        ));

        let duration = start.elapsed();
        if self.options.telemetry {
            samples.push(MetricSample::unlabeled(
                &metrics::SCRAPE_DURATION,
                duration.as_secs_f64(),
            ));
            samples.push(MetricSample::unlabeled(
                &metrics::SCRAPE_FAILED_CONTAINERS,
                containers_failed as f64,
            ));
        }

        info!(
            "Scrape completed: {} containers in scope, {} failed, {} samples, {:.2}ms",
            containers_in_scope,
            containers_failed,
            samples.len(),
            duration.as_secs_f64() * 1000.0
        );

        Ok(Snapshot {
            samples,
            containers_listed,
            containers_in_scope,
            containers_failed,
            total_memory,
            duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LabelDefinition;
    use crate::runtime::{FixtureContainer, FixtureRuntime};

    const MB: u64 = 1_000_000;

    fn collector(containers: Vec<FixtureContainer>, options: CollectorOptions) -> Collector {
        let runtime = Arc::new(FixtureRuntime::new(containers));
        Collector::new(
            runtime,
            ServiceFilter::new(&[], true, &[]).unwrap(),
            LabelResolver::default(),
            options,
        )
    }

    fn quiet() -> CollectorOptions {
        CollectorOptions {
            telemetry: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_example_fleet() {
        let c = collector(
            vec![
                FixtureContainer::new("a", "A", "running").with_memory(
                    300 * MB,
                    1000 * MB,
                    &[("total_inactive_file", 50 * MB)],
                ),
                FixtureContainer::new("b", "B", "running").with_memory(
                    100 * MB,
                    1000 * MB,
                    &[("inactive_file", 150 * MB)],
                ),
                FixtureContainer::new("c", "C", "exited"),
            ],
            quiet(),
        );

        let snapshot = c.scrape().await.unwrap();

        assert_eq!(snapshot.value_for(&metrics::MEMORY_USAGE, "A"), Some(250.0 * MB as f64));
        assert_eq!(snapshot.value_for(&metrics::MEMORY_USAGE, "B"), Some(0.0));
        assert_eq!(snapshot.value_for(&metrics::MEMORY_USAGE, "C"), None);
        assert_eq!(snapshot.value_for(&metrics::CONTAINER_INFO, "C"), Some(1.0));
        assert_eq!(snapshot.total_memory, 250 * MB);

        let totals: Vec<_> = snapshot.family(&metrics::TOTAL_MEMORY_USAGE).collect();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].value, 250.0 * MB as f64);
    }

    #[tokio::test]
    async fn test_stopped_container_reports_presence_only() {
        let c = collector(
            vec![FixtureContainer::new("c", "C", "exited").with_memory(10, 10, &[])],
            quiet(),
        );
        let snapshot = c.scrape().await.unwrap();

        let for_c: Vec<_> = snapshot
            .samples
            .iter()
            .filter(|s| s.label("name") == Some("C"))
            .collect();
        assert_eq!(for_c.len(), 1);
        assert_eq!(for_c[0].def, &metrics::CONTAINER_INFO);
        assert_eq!(for_c[0].label("state"), Some("exited"));
    }

    #[tokio::test]
    async fn test_empty_fleet_reports_zero_total() {
        let snapshot = collector(vec![], quiet()).scrape().await.unwrap();
        assert_eq!(snapshot.samples.len(), 1);
        assert_eq!(snapshot.total_memory, 0);
    }

    #[tokio::test]
    async fn test_single_container_total() {
        let c = collector(
            vec![FixtureContainer::new("a", "A", "running").with_memory(1234, 0, &[])],
            quiet(),
        );
        assert_eq!(c.scrape().await.unwrap().total_memory, 1234);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_containers_total_is_exact() {
        let containers: Vec<_> = (0..64u64)
            .map(|i| {
                FixtureContainer::new(format!("id{i}"), format!("svc{i}"), "running")
                    .with_memory(1000 + i, 0, &[("inactive_file", i)])
            })
            .collect();
        let c = collector(
            containers,
            CollectorOptions {
                max_concurrency: 8,
                ..quiet()
            },
        );

        for _ in 0..3 {
            let snapshot = c.scrape().await.unwrap();
            let per_container: f64 = snapshot.family(&metrics::MEMORY_USAGE).map(|s| s.value).sum();
            assert_eq!(snapshot.total_memory, 64 * 1000);
            assert_eq!(per_container, 64_000.0);
        }
    }

    #[tokio::test]
    async fn test_failing_container_does_not_affect_siblings() {
        let c = collector(
            vec![
                FixtureContainer::new("a", "A", "running").with_memory(100, 0, &[]),
                FixtureContainer::new("b", "B", "running")
                    .with_memory(900, 0, &[])
                    .failing(),
                FixtureContainer::new("d", "D", "running").with_memory(20, 0, &[]),
            ],
            CollectorOptions::default(),
        );

        let snapshot = c.scrape().await.unwrap();
        assert_eq!(snapshot.containers_failed, 1);
        assert_eq!(snapshot.value_for(&metrics::MEMORY_USAGE, "A"), Some(100.0));
        assert_eq!(snapshot.value_for(&metrics::MEMORY_USAGE, "D"), Some(20.0));
        assert_eq!(snapshot.value_for(&metrics::MEMORY_USAGE, "B"), None);
        assert_eq!(snapshot.value_for(&metrics::CONTAINER_INFO, "B"), Some(1.0));
        assert_eq!(snapshot.total_memory, 120);

        let failed: Vec<_> = snapshot.family(&metrics::SCRAPE_FAILED_CONTAINERS).collect();
        assert_eq!(failed[0].value, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_container_times_out() {
        let c = collector(
            vec![
                FixtureContainer::new("a", "A", "running").with_memory(100, 0, &[]),
                FixtureContainer::new("s", "Slow", "running")
                    .with_memory(500, 0, &[])
                    .delayed(Duration::from_secs(3600)),
            ],
            CollectorOptions {
                stats_timeout: Duration::from_secs(2),
                ..quiet()
            },
        );

        let snapshot = c.scrape().await.unwrap();
        assert_eq!(snapshot.containers_failed, 1);
        assert_eq!(snapshot.value_for(&metrics::MEMORY_USAGE, "Slow"), None);
        assert_eq!(snapshot.total_memory, 100);
    }

    #[tokio::test]
    async fn test_inventory_failure_aborts_cycle() {
        let runtime = Arc::new(FixtureRuntime::new(vec![
            FixtureContainer::new("a", "A", "running").with_memory(100, 0, &[]),
        ]));
        let c = Collector::new(
            runtime.clone(),
            ServiceFilter::new(&[], true, &[]).unwrap(),
            LabelResolver::default(),
            quiet(),
        );

        runtime.set_listing_fails(true);
        assert!(matches!(c.scrape().await, Err(ScrapeError::Inventory(_))));

        runtime.set_listing_fails(false);
        let snapshot = c.scrape().await.unwrap();
        assert_eq!(snapshot.total_memory, 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_scrape_does_not_leak_into_next() {
        let c = collector(
            vec![
                FixtureContainer::new("a", "A", "running").with_memory(100, 0, &[]),
                FixtureContainer::new("b", "B", "running")
                    .with_memory(200, 0, &[])
                    .delayed(Duration::from_millis(200)),
            ],
            quiet(),
        );

        // The client goes away while B is still being collected.
        let cancelled = tokio::time::timeout(Duration::from_millis(50), c.scrape()).await;
        assert!(cancelled.is_err());

        let snapshot = c.scrape().await.unwrap();
        assert_eq!(snapshot.containers_failed, 0);
        assert_eq!(snapshot.total_memory, 300);
    }

    #[tokio::test]
    async fn test_filter_limits_scope() {
        let runtime = Arc::new(FixtureRuntime::new(vec![
            FixtureContainer::new("a", "A", "running").with_memory(100, 0, &[]),
            FixtureContainer::new("b", "B", "running").with_memory(200, 0, &[]),
        ]));
        let inventory = runtime.list_containers().await.unwrap();
        let filter = ServiceFilter::new(&["B".to_string()], false, &inventory).unwrap();
        let c = Collector::new(runtime, filter, LabelResolver::default(), quiet());

        let snapshot = c.scrape().await.unwrap();
        assert_eq!(snapshot.containers_listed, 2);
        assert_eq!(snapshot.containers_in_scope, 1);
        assert_eq!(snapshot.value_for(&metrics::CONTAINER_INFO, "A"), None);
        assert_eq!(snapshot.total_memory, 200);
    }

    #[tokio::test]
    async fn test_label_failure_drops_only_that_container() {
        let runtime = Arc::new(FixtureRuntime::new(vec![
            FixtureContainer::new("a", "A", "running")
                .with_label("team", "payments")
                .with_health("healthy")
                .with_memory(100, 0, &[]),
            FixtureContainer::new("b", "B", "running").with_memory(200, 0, &[]),
        ]));
        let labels = LabelResolver::compile(&[
            LabelDefinition {
                name: "team".into(),
                template: r#"{{ .Container.Labels["team"] }}"#.into(),
            },
            LabelDefinition {
                name: "health".into(),
                template: "{{ .ContainerJSON.State.Health.Status }}".into(),
            },
        ])
        .unwrap();
        let c = Collector::new(
            runtime,
            ServiceFilter::new(&[], true, &[]).unwrap(),
            labels,
            quiet(),
        );

        // B has no healthcheck, so State.Health is absent.
        let snapshot = c.scrape().await.unwrap();
        assert_eq!(snapshot.containers_failed, 1);
        assert_eq!(snapshot.value_for(&metrics::CONTAINER_INFO, "B"), None);
        assert_eq!(snapshot.total_memory, 100);

        let info = snapshot
            .family(&metrics::CONTAINER_INFO)
            .next()
            .unwrap();
        assert_eq!(info.label("team"), Some("payments"));
        assert_eq!(info.label("health"), Some("healthy"));
        assert_eq!(c.label_names(), ["name", "state", "team", "health"]);
    }

    #[tokio::test]
    async fn test_unset_label_key_renders_empty() {
        let runtime = Arc::new(FixtureRuntime::new(vec![
            FixtureContainer::new("a", "A", "running")
                .with_label("team", "payments")
                .with_memory(100, 0, &[]),
            FixtureContainer::new("b", "B", "running").with_memory(200, 0, &[]),
        ]));
        let labels = LabelResolver::compile(&[LabelDefinition {
            name: "team".into(),
            template: r#"{{ .Container.Labels["team"] }}"#.into(),
        }])
        .unwrap();
        let c = Collector::new(
            runtime,
            ServiceFilter::new(&[], true, &[]).unwrap(),
            labels,
            quiet(),
        );

        let snapshot = c.scrape().await.unwrap();
        assert_eq!(snapshot.containers_failed, 0);
        assert_eq!(snapshot.value_for(&metrics::CONTAINER_INFO, "B"), Some(1.0));
        assert_eq!(snapshot.total_memory, 300);

        let teams: Vec<_> = snapshot
            .family(&metrics::CONTAINER_INFO)
            .map(|s| s.label("team").unwrap_or_default().to_string())
            .collect();
        assert!(teams.contains(&"".to_string()));
        assert!(teams.contains(&"payments".to_string()));
    }
}
