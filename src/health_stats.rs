//! Running statistics about the exporter itself, rendered by `/health`.

use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::collector::Snapshot;

#[derive(Clone, Copy, Default)]
struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
            self.last = value;
            self.sum = value;
            self.count = 1;
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

#[derive(Default)]
struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    /// (current, average, max, min)
    fn snapshot(&self) -> (f64, f64, f64, f64) {
        if let Ok(s) = self.inner.lock() {
            (s.last, s.avg(), s.max, s.min)
        } else {
            (0.0, 0.0, 0.0, 0.0)
        }
    }
}

/// Scrape statistics accumulated since startup.
pub struct HealthStats {
    started: Instant,
    containers_in_scope: Stat,
    failed_containers: Stat,
    scrape_duration_seconds: Stat,
    total_scrapes: AtomicU64,
    failed_scrapes: AtomicU64,
    http_requests: AtomicU64,
    last_scrape_failed: AtomicBool,
}

impl Default for HealthStats {
    fn default() -> Self {
        Self {
            started: Instant::now(),
            containers_in_scope: Stat::default(),
            failed_containers: Stat::default(),
            scrape_duration_seconds: Stat::default(),
            total_scrapes: AtomicU64::new(0),
            failed_scrapes: AtomicU64::new(0),
            http_requests: AtomicU64::new(0),
            last_scrape_failed: AtomicBool::new(false),
        }
    }
}

impl HealthStats {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn record_scrape(&self, snapshot: &Snapshot) {
        self.containers_in_scope
            .add_sample(snapshot.containers_in_scope as f64);
        self.failed_containers
            .add_sample(snapshot.containers_failed as f64);
        self.scrape_duration_seconds
            .add_sample(snapshot.duration.as_secs_f64());
        self.total_scrapes.fetch_add(1, Ordering::Relaxed);
        self.last_scrape_failed.store(false, Ordering::Relaxed);
    }

    /// A scrape that produced no samples because the inventory was unavailable.
    pub fn record_failed_scrape(&self) {
        self.total_scrapes.fetch_add(1, Ordering::Relaxed);
        self.failed_scrapes.fetch_add(1, Ordering::Relaxed);
        self.last_scrape_failed.store(true, Ordering::Relaxed);
    }

    pub fn record_http_request(&self) {
        self.http_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_scrape_failed(&self) -> bool {
        self.last_scrape_failed.load(Ordering::Relaxed)
    }

    pub fn total_scrapes(&self) -> u64 {
        self.total_scrapes.load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub fn render_table(&self) -> String {
        let left_col = 26usize;
        let col_w = 12usize;

        let mut out = String::new();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "metric",
            "current",
            "average",
            "max",
            "min",
            left = left_col,
            col = col_w
        )
        .ok();
        writeln!(out, "{}", "-".repeat(left_col + 3 + (col_w + 3) * 4)).ok();

        let rows = [
            ("containers in scope", &self.containers_in_scope, 0usize),
            ("failed containers", &self.failed_containers, 0),
            ("scrape duration (s)", &self.scrape_duration_seconds, 3),
        ];
        for (label, stat, precision) in rows {
            let (cur, avg, max, min) = stat.snapshot();
            writeln!(
                out,
                "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
                label,
                format!("{:.p$}", cur, p = precision),
                format!("{:.p$}", avg, p = precision.max(1)),
                format!("{:.p$}", max, p = precision),
                format!("{:.p$}", min, p = precision),
                left = left_col,
                col = col_w
            )
            .ok();
        }

        writeln!(out).ok();
        writeln!(out, "number of scrapes: {}", self.total_scrapes()).ok();
        writeln!(
            out,
            "failed scrapes: {}",
            self.failed_scrapes.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(
            out,
            "http requests: {}",
            self.http_requests.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(out, "uptime (s): {}", self.uptime_seconds()).ok();

        out
    }
}
