//! Log retention sweepers.
//!
//! Each configured cleaner periodically walks a directory tree and deletes
//! regular files older than its retention age. Sweepers share nothing with
//! the collection engine.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::CleanerConfig;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Counters from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub errors: usize,
}

/// Deletes every regular file under `root` last modified more than
/// `max_age` before `now`. Symlinks are not followed; unreadable entries
/// are logged and skipped.
pub fn sweep(root: &Path, max_age: Duration, now: SystemTime) -> SweepReport {
    let mut report = SweepReport::default();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(
                    "Failed to access {}: {}",
                    e.path().unwrap_or(root).display(),
                    e
                );
                report.errors += 1;
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                warn!("Failed to access {}: {}", path.display(), e);
                report.errors += 1;
                continue;
            }
        };

        report.scanned += 1;
        let age = meta
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());

        if age.is_some_and(|age| age > max_age) {
            match fs::remove_file(path) {
                Ok(()) => {
                    debug!("Removed {}", path.display());
                    report.removed += 1;
                }
                Err(e) => {
                    error!("Failed to delete {}: {}", path.display(), e);
                    report.errors += 1;
                }
            }
        }
    }

    report
}

/// Starts one cleaner as a background task.
pub fn spawn_cleaner(cfg: CleanerConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let max_age = Duration::from_secs(cfg.max_age_days.saturating_mul(SECS_PER_DAY));
        let mut ticker = interval(Duration::from_secs(cfg.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Cleaner '{}' started: {} (retention {} days, every {}s)",
            cfg.name,
            cfg.path.display(),
            cfg.max_age_days,
            cfg.interval_secs
        );

        loop {
            ticker.tick().await;

            let root = cfg.path.clone();
            let result =
                tokio::task::spawn_blocking(move || sweep(&root, max_age, SystemTime::now())).await;

            match result {
                Ok(report) if report.errors == 0 => info!(
                    "Cleaner '{}' finished: {} files scanned, {} removed",
                    cfg.name, report.scanned, report.removed
                ),
                Ok(report) => warn!(
                    "Cleaner '{}' finished with {} errors: {} files scanned, {} removed",
                    cfg.name, report.errors, report.scanned, report.removed
                ),
                Err(e) => error!("Cleaner '{}' sweep did not complete: {}", cfg.name, e),
            }
        }
    })
}
