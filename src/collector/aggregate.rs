//! Cross-container memory total for one scrape cycle.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Counter storage aligned to its own cache line so that the hot `add`
/// path never shares a line with neighbouring data.
#[repr(align(64))]
#[derive(Debug, Default)]
struct CacheAligned(AtomicU64);

#[derive(Debug, Default)]
struct CycleState {
    value: CacheAligned,
    closed: AtomicBool,
}

/// Serializes scrape cycles and hands each one a fresh accumulator.
///
/// A cycle's total lives only as long as its [`CycleGuard`]. A task that
/// outlives a cancelled cycle still holds that cycle's [`CycleTotal`], so a
/// late `add` lands in an accumulator nobody reads again and can never leak
/// into the next cycle.
#[derive(Debug, Default)]
pub struct TotalMemory {
    epoch: Mutex<u64>,
}

impl TotalMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for any running cycle to finish and starts a new one at zero.
    pub async fn begin_cycle(&self) -> CycleGuard<'_> {
        let mut epoch = self.epoch.lock().await;
        *epoch += 1;

        CycleGuard {
            total: CycleTotal {
                state: Arc::new(CycleState::default()),
                epoch: *epoch,
            },
            _epoch: epoch,
        }
    }
}

/// Handle through which collection tasks feed one cycle's total.
#[derive(Debug, Clone)]
pub struct CycleTotal {
    state: Arc<CycleState>,
    epoch: u64,
}

impl CycleTotal {
    /// Adds one container's contribution. Safe from any number of tasks.
    /// Returns `false` once the cycle has ended.
    pub fn add(&self, amount: u64) -> bool {
        if self.state.closed.load(Ordering::Acquire) {
            debug!(
                "Discarding {} bytes reported after cycle {} ended",
                amount, self.epoch
            );
            return false;
        }
        self.state.value.0.fetch_add(amount, Ordering::Relaxed);
        true
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    fn read(&self) -> u64 {
        self.state.value.0.load(Ordering::Acquire)
    }
}

/// Exclusive ownership of one cycle. Dropping the guard, on completion or
/// cancellation, closes the cycle's accumulator.
pub struct CycleGuard<'a> {
    total: CycleTotal,
    _epoch: MutexGuard<'a, u64>,
}

impl CycleGuard<'_> {
    /// Handle to give every collection task of this cycle.
    pub fn total(&self) -> CycleTotal {
        self.total.clone()
    }

    /// Reads the cycle total; call only after every task has been joined.
    pub fn finish(self) -> u64 {
        self.total.read()
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.total.state.closed.store(true, Ordering::Release);
    }
}
