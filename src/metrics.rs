//! Prometheus metric definitions and exposition for services-metrics-exporter.
//!
//! A scrape produces plain [`MetricSample`] values. [`encode`] turns one
//! scrape's samples into the Prometheus text format through a registry that
//! lives only for that request, so nothing leaks from one cycle into the next.

use ahash::AHashMap as HashMap;
use prometheus::{Counter, CounterVec, Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::hash_map::Entry;
use std::sync::Arc;
use thiserror::Error;

/// Initial buffer capacity for the text exposition.
const BUFFER_CAP: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
}

/// Static description of one metric family.
#[derive(Debug, PartialEq, Eq)]
pub struct MetricDef {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
}

pub static CONTAINER_INFO: MetricDef = MetricDef {
    name: "docker_container_info",
    help: "Container presence and lifecycle state (always 1)",
    kind: MetricKind::Gauge,
};
pub static CPU_SECONDS: MetricDef = MetricDef {
    name: "docker_container_cpu_seconds_total",
    help: "Cumulative CPU time consumed by the container in seconds",
    kind: MetricKind::Counter,
};
pub static MEMORY_USAGE: MetricDef = MetricDef {
    name: "docker_container_memory_usage_bytes",
    help: "Container memory usage in bytes, excluding reclaimable file cache",
    kind: MetricKind::Gauge,
};
pub static MEMORY_LIMIT: MetricDef = MetricDef {
    name: "docker_container_memory_limit_bytes",
    help: "Container memory limit in bytes",
    kind: MetricKind::Gauge,
};
pub static NETWORK_RX: MetricDef = MetricDef {
    name: "docker_container_network_rx_bytes_total",
    help: "Bytes received over all container network interfaces",
    kind: MetricKind::Counter,
};
pub static NETWORK_TX: MetricDef = MetricDef {
    name: "docker_container_network_tx_bytes_total",
    help: "Bytes transmitted over all container network interfaces",
    kind: MetricKind::Counter,
};
pub static BLKIO_READ: MetricDef = MetricDef {
    name: "docker_container_blkio_read_bytes_total",
    help: "Bytes read from all block devices",
    kind: MetricKind::Counter,
};
pub static BLKIO_WRITE: MetricDef = MetricDef {
    name: "docker_container_blkio_write_bytes_total",
    help: "Bytes written to all block devices",
    kind: MetricKind::Counter,
};
pub static PIDS: MetricDef = MetricDef {
    name: "docker_container_pids",
    help: "Number of processes and threads in the container",
    kind: MetricKind::Gauge,
};
pub static DISK_USAGE: MetricDef = MetricDef {
    name: "docker_container_disk_usage_bytes",
    help: "Size of the container writable layer in bytes",
    kind: MetricKind::Gauge,
};
pub static DISK_SIZE_ROOTFS: MetricDef = MetricDef {
    name: "docker_container_disk_size_rootfs_bytes",
    help: "Total size of the container root filesystem in bytes",
    kind: MetricKind::Gauge,
};
pub static TOTAL_MEMORY_USAGE: MetricDef = MetricDef {
    name: "docker_total_memory_usage_bytes",
    help: "Sum of docker_container_memory_usage_bytes over all collected containers",
    kind: MetricKind::Gauge,
};
pub static SCRAPE_DURATION: MetricDef = MetricDef {
    name: "docker_exporter_scrape_duration_seconds",
    help: "Time spent collecting this scrape",
    kind: MetricKind::Gauge,
};
pub static SCRAPE_FAILED_CONTAINERS: MetricDef = MetricDef {
    name: "docker_exporter_scrape_failed_containers",
    help: "Containers whose metrics could not be collected in this scrape",
    kind: MetricKind::Gauge,
};

/// Every family the exporter can emit, in documentation order.
pub static ALL_METRICS: [&MetricDef; 14] = [
    &CONTAINER_INFO,
    &CPU_SECONDS,
    &MEMORY_USAGE,
    &MEMORY_LIMIT,
    &NETWORK_RX,
    &NETWORK_TX,
    &BLKIO_READ,
    &BLKIO_WRITE,
    &PIDS,
    &DISK_USAGE,
    &DISK_SIZE_ROOTFS,
    &TOTAL_MEMORY_USAGE,
    &SCRAPE_DURATION,
    &SCRAPE_FAILED_CONTAINERS,
];

/// One value of one series for the current scrape.
#[derive(Debug, Clone)]
pub struct MetricSample {
    pub def: &'static MetricDef,
    pub label_names: Arc<[String]>,
    pub label_values: Vec<String>,
    pub value: f64,
}

impl MetricSample {
    pub fn new(
        def: &'static MetricDef,
        label_names: Arc<[String]>,
        label_values: Vec<String>,
        value: f64,
    ) -> Self {
        Self {
            def,
            label_names,
            label_values,
            value,
        }
    }

    /// A sample without labels.
    pub fn unlabeled(def: &'static MetricDef, value: f64) -> Self {
        Self::new(def, Arc::from(Vec::new()), Vec::new(), value)
    }

    pub fn name(&self) -> &'static str {
        self.def.name
    }

    pub fn kind(&self) -> MetricKind {
        self.def.kind
    }

    /// Value of the named label, if present.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.label_names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.label_values.get(i))
            .map(String::as_str)
    }
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error(transparent)]
    Prometheus(#[from] prometheus::Error),

    #[error("exposition output is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

enum Family {
    Gauge(GaugeVec),
    Counter(CounterVec),
    PlainGauge(Gauge),
    PlainCounter(Counter),
}

/// Encodes one scrape's samples in the Prometheus text format.
pub fn encode(samples: &[MetricSample]) -> Result<String, EncodeError> {
    let registry = Registry::new();
    let mut families: HashMap<&'static str, Family> = HashMap::new();

    for sample in samples {
        let family = match families.entry(sample.def.name) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let family = new_family(sample)?;
                match &family {
                    Family::Gauge(v) => registry.register(Box::new(v.clone()))?,
                    Family::Counter(v) => registry.register(Box::new(v.clone()))?,
                    Family::PlainGauge(g) => registry.register(Box::new(g.clone()))?,
                    Family::PlainCounter(c) => registry.register(Box::new(c.clone()))?,
                }
                entry.insert(family)
            }
        };

        let values: Vec<&str> = sample.label_values.iter().map(String::as_str).collect();
        match family {
            Family::Gauge(vec) => vec
                .get_metric_with_label_values(values.as_slice())?
                .set(sample.value),
            Family::Counter(vec) => vec
                .get_metric_with_label_values(values.as_slice())?
                .inc_by(sample.value),
            Family::PlainGauge(gauge) => gauge.set(sample.value),
            Family::PlainCounter(counter) => counter.inc_by(sample.value),
        }
    }

    let mut buffer = Vec::with_capacity(BUFFER_CAP);
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

fn new_family(sample: &MetricSample) -> Result<Family, prometheus::Error> {
    let opts = Opts::new(sample.def.name, sample.def.help);
    let names: Vec<&str> = sample.label_names.iter().map(String::as_str).collect();

    Ok(match (sample.def.kind, names.is_empty()) {
        (MetricKind::Gauge, false) => Family::Gauge(GaugeVec::new(opts, names.as_slice())?),
        (MetricKind::Counter, false) => Family::Counter(CounterVec::new(opts, names.as_slice())?),
        (MetricKind::Gauge, true) => Family::PlainGauge(Gauge::with_opts(opts)?),
        (MetricKind::Counter, true) => Family::PlainCounter(Counter::with_opts(opts)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Arc<[String]> {
        Arc::from(vec!["name".to_string(), "state".to_string()])
    }

    #[test]
    fn test_encode_labeled_and_unlabeled_families() {
        let samples = vec![
            MetricSample::new(&MEMORY_USAGE, labels(), vec!["a".into(), "running".into()], 250000000.0),
            MetricSample::new(&MEMORY_USAGE, labels(), vec!["b".into(), "running".into()], 0.0),
            MetricSample::new(&CPU_SECONDS, labels(), vec!["a".into(), "running".into()], 2.5),
            MetricSample::unlabeled(&TOTAL_MEMORY_USAGE, 250000000.0),
        ];

        let text = encode(&samples).unwrap();

        assert!(text.contains("# TYPE docker_container_memory_usage_bytes gauge"));
        assert!(text.contains("# TYPE docker_container_cpu_seconds_total counter"));
        assert!(text.contains(
            "docker_container_memory_usage_bytes{name=\"a\",state=\"running\"} 250000000"
        ));
        assert!(text.contains("docker_container_memory_usage_bytes{name=\"b\",state=\"running\"} 0"));
        assert!(text.contains("docker_container_cpu_seconds_total{name=\"a\",state=\"running\"} 2.5"));
        assert!(text.contains("docker_total_memory_usage_bytes 250000000"));
        assert!(text.contains("# HELP docker_total_memory_usage_bytes"));
    }

    #[test]
    fn test_encode_empty_snapshot() {
        assert_eq!(encode(&[]).unwrap(), "");
    }

    #[test]
    fn test_encode_rejects_label_count_mismatch() {
        let bad = MetricSample::new(&PIDS, labels(), vec!["only-name".into()], 1.0);
        assert!(encode(&[bad]).is_err());
    }

    #[test]
    fn test_label_lookup() {
        let sample = MetricSample::new(&PIDS, labels(), vec!["api".into(), "running".into()], 3.0);
        assert_eq!(sample.label("name"), Some("api"));
        assert_eq!(sample.label("state"), Some("running"));
        assert_eq!(sample.label("missing"), None);
        assert_eq!(sample.kind(), MetricKind::Gauge);
    }

    #[test]
    fn test_metric_names_are_unique() {
        let mut names: Vec<&str> = ALL_METRICS.iter().map(|d| d.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), ALL_METRICS.len());
    }
}
