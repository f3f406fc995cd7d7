//! Cache-adjusted memory accounting.
//!
//! The engine reports usage including reclaimable page cache. Which counter
//! holds the reclaimable part depends on the cgroup version of the host, and
//! is decided per container from the keys actually present.

use ahash::AHashMap as HashMap;

use crate::runtime::ResourceSnapshot;

/// Inactive file cache as reported under cgroup v1.
pub const CGROUP_V1_CACHE_KEY: &str = "total_inactive_file";
/// Inactive file cache as reported under cgroup v2.
pub const CGROUP_V2_CACHE_KEY: &str = "inactive_file";

/// Returns the sub-counter holding reclaimable cache, if any.
pub fn cache_key(stats: &HashMap<String, u64>) -> Option<&'static str> {
    if stats.contains_key(CGROUP_V1_CACHE_KEY) {
        Some(CGROUP_V1_CACHE_KEY)
    } else if stats.contains_key(CGROUP_V2_CACHE_KEY) {
        Some(CGROUP_V2_CACHE_KEY)
    } else {
        None
    }
}

/// Usage minus reclaimable cache, never below zero.
pub fn effective_memory(snapshot: &ResourceSnapshot) -> u64 {
    let cache = cache_key(&snapshot.memory_stats)
        .and_then(|key| snapshot.memory_stats.get(key))
        .copied()
        .unwrap_or(0);

    snapshot.memory_usage.saturating_sub(cache)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(usage: u64, counters: &[(&str, u64)]) -> ResourceSnapshot {
        ResourceSnapshot {
            memory_usage: usage,
            memory_stats: counters
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_cgroup_v1_subtracts_total_inactive_file() {
        let s = snapshot(300, &[("total_inactive_file", 50), ("inactive_file", 10)]);
        assert_eq!(cache_key(&s.memory_stats), Some(CGROUP_V1_CACHE_KEY));
        assert_eq!(effective_memory(&s), 250);
    }

    #[test]
    fn test_cgroup_v2_subtracts_inactive_file() {
        let s = snapshot(300, &[("inactive_file", 120), ("anon", 100)]);
        assert_eq!(cache_key(&s.memory_stats), Some(CGROUP_V2_CACHE_KEY));
        assert_eq!(effective_memory(&s), 180);
    }

    #[test]
    fn test_no_cache_counter_keeps_usage() {
        let s = snapshot(300, &[("cache", 200)]);
        assert_eq!(cache_key(&s.memory_stats), None);
        assert_eq!(effective_memory(&s), 300);
    }

    #[test]
    fn test_cache_above_usage_clamps_to_zero() {
        let s = snapshot(100_000_000, &[("inactive_file", 150_000_000)]);
        assert_eq!(effective_memory(&s), 0);
    }

    #[test]
    fn test_cache_equal_to_usage_is_zero() {
        let s = snapshot(64, &[("total_inactive_file", 64)]);
        assert_eq!(effective_memory(&s), 0);
    }
}
