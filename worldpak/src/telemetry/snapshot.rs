//! Serializable diagnostics snapshots.

use std::fmt;

use serde::Serialize;

use crate::cache::CacheStats;

/// Resolution tier counters at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolverSnapshot {
    pub embedded_hits: u64,
    pub overlay_hits: u64,
    pub parent_hits: u64,
    pub scan_hits: u64,
    pub misses: u64,
    pub parent_cycles: u64,
    pub distinct_misses: usize,
    pub miss_overflow: u64,
}

impl ResolverSnapshot {
    pub fn requests(&self) -> u64 {
        self.embedded_hits + self.overlay_hits + self.parent_hits + self.scan_hits + self.misses
    }

    pub fn hits(&self) -> u64 {
        self.requests() - self.misses
    }
}

impl fmt::Display for ResolverSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} requests: {} embedded, {} overlay, {} parent, {} scan, {} misses ({} distinct), {} cycles",
            self.requests(),
            self.embedded_hits,
            self.overlay_hits,
            self.parent_hits,
            self.scan_hits,
            self.misses,
            self.distinct_misses,
            self.parent_cycles,
        )
    }
}

/// Everything external reporting consumes: both cache views plus the
/// resolver counters. Serializes to JSON as-is.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsSnapshot {
    pub mesh: CacheStats,
    pub texture: CacheStats,
    pub resolver: ResolverSnapshot,
}

impl DiagnosticsSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for DiagnosticsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "mesh cache: {}", self.mesh)?;
        writeln!(f, "texture cache: {}", self.texture)?;
        write!(f, "resolver: {}", self.resolver)
    }
}
