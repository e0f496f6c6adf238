//! Cache counters for diagnostics.

use std::fmt;

use serde::Serialize;

/// Point-in-time view of one cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub resident_bytes: u64,
    pub budget_bytes: u64,
    pub resident_entries: usize,
    pub pinned_entries: usize,
    pub loading_entries: usize,
    /// Remembered failures still within their time-to-live.
    pub failed_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub loads_completed: u64,
    pub load_failures: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Hits over all lookups that could have hit. Zero lookups reads as 0.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} bytes in {} entries ({} pinned, {} loading, {} failed), {} hits / {} misses, {} evictions, {} failed loads",
            self.resident_bytes,
            self.budget_bytes,
            self.resident_entries,
            self.pinned_entries,
            self.loading_entries,
            self.failed_entries,
            self.hits,
            self.misses,
            self.evictions,
            self.load_failures,
        )
    }
}
