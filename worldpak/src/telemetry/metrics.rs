//! Resolver counters and the miss report.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::hash::ContentHash;

use super::snapshot::ResolverSnapshot;

/// Distinct missed hashes remembered before the report only counts overflow.
pub const MISS_REPORT_CAP: usize = 1024;

#[derive(Default)]
struct MissReport {
    hashes: HashSet<ContentHash>,
    overflow: u64,
}

/// Counters for each resolution tier plus a bounded set of distinct
/// missed hashes. Shared between the resolver and diagnostics; counter
/// updates are lock-free, only the miss report takes a lock.
#[derive(Default)]
pub struct ResolverMetrics {
    embedded_hits: AtomicU64,
    overlay_hits: AtomicU64,
    parent_hits: AtomicU64,
    scan_hits: AtomicU64,
    misses: AtomicU64,
    parent_cycles: AtomicU64,
    miss_report: Mutex<MissReport>,
}

impl ResolverMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_embedded_hit(&self) {
        self.embedded_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_overlay_hit(&self) {
        self.overlay_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_parent_hit(&self) {
        self.parent_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_scan_hit(&self) {
        self.scan_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_parent_cycle(&self) {
        self.parent_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self, hash: ContentHash) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        let mut report = self.miss_report.lock();
        if report.hashes.contains(&hash) {
            return;
        }
        if report.hashes.len() < MISS_REPORT_CAP {
            report.hashes.insert(hash);
        } else {
            report.overflow += 1;
        }
    }

    /// Distinct missed hashes, sorted for stable output.
    pub fn miss_report(&self) -> Vec<ContentHash> {
        let report = self.miss_report.lock();
        let mut hashes: Vec<ContentHash> = report.hashes.iter().copied().collect();
        hashes.sort_unstable();
        hashes
    }

    pub fn snapshot(&self) -> ResolverSnapshot {
        let (distinct_misses, miss_overflow) = {
            let report = self.miss_report.lock();
            (report.hashes.len(), report.overflow)
        };
        ResolverSnapshot {
            embedded_hits: self.embedded_hits.load(Ordering::Relaxed),
            overlay_hits: self.overlay_hits.load(Ordering::Relaxed),
            parent_hits: self.parent_hits.load(Ordering::Relaxed),
            scan_hits: self.scan_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            parent_cycles: self.parent_cycles.load(Ordering::Relaxed),
            distinct_misses,
            miss_overflow,
        }
    }
}
