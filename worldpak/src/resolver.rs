//! Content hash resolution.
//!
//! A resolution request asks "where are the bytes for hash `h`?" and is
//! answered through four tiers, cheapest first:
//!
//! 1. the dictionary embedded in the requesting object,
//! 2. the overlay indexes, walked in descending priority,
//! 3. the dictionary parent chain declared by the object's dictionary,
//! 4. an optional exhaustive scan across every entry (off by default).
//!
//! A miss is an answer, not an error: the caller substitutes a
//! placeholder and the miss lands in the metrics report. The only fatal
//! resolution condition is a cycle in the parent chain.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::hash::ContentHash;
use crate::overlay::{DictionaryTable, OverlaySet, PackLocation};
use crate::telemetry::ResolverMetrics;

pub const DEFAULT_MAX_PARENT_DEPTH: usize = 8;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("dictionary parent chain revisited {hash}")]
    ParentCycle { hash: ContentHash },
}

/// Where resolved bytes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedSource {
    /// Satisfied by the dictionary already loaded with the requesting
    /// object; no archive read needed.
    Embedded,
    /// Stored at a location in the overlay stack.
    Pack(PackLocation),
}

/// Per-request context: the requesting object's own dictionary and the
/// start of its parent chain.
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    embedded: Option<Arc<DictionaryTable>>,
    parent: Option<ContentHash>,
}

impl ResolveContext {
    /// No embedded dictionary, no parent chain.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Context for an object that ships its own dictionary. The parent
    /// chain starts at that dictionary's parent link.
    pub fn for_object(dictionary: Arc<DictionaryTable>) -> Self {
        let parent = dictionary.parent();
        Self {
            embedded: Some(dictionary),
            parent,
        }
    }

    /// Override the parent chain start, for objects whose dictionary is
    /// packed rather than embedded.
    pub fn with_parent(mut self, parent: ContentHash) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn embedded(&self) -> Option<&Arc<DictionaryTable>> {
        self.embedded.as_ref()
    }

    pub fn parent(&self) -> Option<ContentHash> {
        self.parent
    }
}

/// Resolver tuning.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Tier 4: scan every entry of every archive on a miss. Costs
    /// O(archives x entries) per call; keep off outside tooling.
    pub enable_global_scan: bool,
    /// Parents consulted before the chain walk gives up.
    pub max_parent_depth: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            enable_global_scan: false,
            max_parent_depth: DEFAULT_MAX_PARENT_DEPTH,
        }
    }
}

impl ResolverOptions {
    pub fn with_global_scan(mut self, on: bool) -> Self {
        self.enable_global_scan = on;
        self
    }

    pub fn with_max_parent_depth(mut self, depth: usize) -> Self {
        self.max_parent_depth = depth;
        self
    }
}

/// Tiered hash resolution over one mounted overlay set.
pub struct ResourceResolver {
    overlays: Arc<OverlaySet>,
    options: ResolverOptions,
    metrics: Arc<ResolverMetrics>,
}

impl ResourceResolver {
    pub fn new(overlays: Arc<OverlaySet>) -> Self {
        Self::with_options(overlays, ResolverOptions::default())
    }

    pub fn with_options(overlays: Arc<OverlaySet>, options: ResolverOptions) -> Self {
        Self {
            overlays,
            options,
            metrics: Arc::new(ResolverMetrics::new()),
        }
    }

    pub fn overlays(&self) -> &Arc<OverlaySet> {
        &self.overlays
    }

    pub fn metrics(&self) -> Arc<ResolverMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Resolve a content hash to a source.
    ///
    /// `Ok(None)` is a miss; the caller substitutes a placeholder.
    ///
    /// # Errors
    ///
    /// `ParentCycle` when the dictionary parent chain revisits a hash.
    pub fn resolve(
        &self,
        hash: ContentHash,
        ctx: &ResolveContext,
    ) -> Result<Option<ResolvedSource>, ResolveError> {
        if let Some(embedded) = &ctx.embedded {
            if embedded.declares(hash) {
                self.metrics.record_embedded_hit();
                return Ok(Some(ResolvedSource::Embedded));
            }
        }

        if let Some(location) = self.overlays.lookup(hash) {
            self.metrics.record_overlay_hit();
            return Ok(Some(ResolvedSource::Pack(location)));
        }

        if let Some(location) = self.walk_parents(hash, ctx.parent)? {
            self.metrics.record_parent_hit();
            return Ok(Some(ResolvedSource::Pack(location)));
        }

        if self.options.enable_global_scan {
            if let Some(location) = self.overlays.scan_for_hash(hash) {
                self.metrics.record_scan_hit();
                return Ok(Some(ResolvedSource::Pack(location)));
            }
        }

        self.metrics.record_miss(hash);
        debug!(%hash, "resolution miss");
        Ok(None)
    }

    /// Follow the dictionary parent chain looking for a dictionary that
    /// declares `hash`. Ends the walk quietly on depth overrun, a parent
    /// absent from the stack, or an unloadable parent; only a revisited
    /// parent is fatal.
    fn walk_parents(
        &self,
        hash: ContentHash,
        start: Option<ContentHash>,
    ) -> Result<Option<PackLocation>, ResolveError> {
        let mut visited: HashSet<ContentHash> = HashSet::new();
        let mut current = start;
        let mut depth = 0usize;

        while let Some(parent_hash) = current {
            if !visited.insert(parent_hash) {
                self.metrics.record_parent_cycle();
                return Err(ResolveError::ParentCycle { hash: parent_hash });
            }
            if depth >= self.options.max_parent_depth {
                warn!(
                    %hash,
                    depth,
                    "parent chain exceeded depth limit, ending walk"
                );
                return Ok(None);
            }
            depth += 1;

            let location = match self.overlays.find_dictionary(parent_hash) {
                Some(location) => location,
                None => {
                    debug!(parent = %parent_hash, "parent dictionary not in stack");
                    return Ok(None);
                }
            };
            let table = match self.overlays.dictionary_table(location) {
                Ok(table) => table,
                Err(error) => {
                    warn!(
                        parent = %parent_hash,
                        %error,
                        "unloadable parent dictionary, ending walk"
                    );
                    return Ok(None);
                }
            };
            if table.declares(hash) {
                return Ok(Some(location));
            }
            current = table.parent();
        }
        Ok(None)
    }
}
