//! The mounted overlay set.
//!
//! Building a set discovers archives under each declared overlay root,
//! opens them, and indexes their content hashes. Corrupt archives are
//! skipped with a warning and listed in the build report; an unreadable
//! overlay root is a configuration error and fails the build. Once built
//! the set is immutable; toggling an overlay means rebuilding.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tracing::{info, warn};

use crate::archive::{ArchiveEntry, ArchiveError, ArchiveReader, ExtractOptions};
use crate::hash::ContentHash;

use super::dictionary::{DictionaryError, DictionaryTable};
use super::index::{is_dictionary, IndexBuildStats, OverlayIndex};
use super::manifest::{ManifestError, OverlayDecl, OverlayManifest};
use super::source::{Overlay, PackLocation};

/// File extension of archives discovered under overlay roots.
pub const ARCHIVE_EXTENSION: &str = "wpk";

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("unknown overlay slot {overlay}")]
    UnknownOverlay { overlay: usize },

    #[error("unknown archive slot {archive} in overlay {overlay}")]
    UnknownArchive { overlay: usize, archive: usize },

    #[error("overlay root {path} is not readable")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Dictionary(#[from] DictionaryError),
}

/// An archive found during discovery but left unmounted.
#[derive(Debug)]
pub struct SkippedArchive {
    pub path: PathBuf,
    pub reason: String,
}

/// What a build did: mounted archives, skipped files, index coverage.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub archives_opened: usize,
    pub skipped: Vec<SkippedArchive>,
    pub indexed_entries: usize,
    pub dictionaries_scanned: usize,
    pub dictionary_failures: usize,
    pub duplicate_hashes: usize,
}

impl BuildReport {
    fn absorb(&mut self, stats: IndexBuildStats) {
        self.indexed_entries += stats.indexed_entries;
        self.dictionaries_scanned += stats.dictionaries_scanned;
        self.dictionary_failures += stats.dictionary_failures;
        self.duplicate_hashes += stats.duplicate_hashes;
    }
}

enum PendingOverlay {
    Declared(OverlayDecl),
    Prebuilt {
        id: String,
        priority: i32,
        archives: Vec<ArchiveReader>,
    },
}

impl PendingOverlay {
    fn id(&self) -> &str {
        match self {
            Self::Declared(decl) => &decl.id,
            Self::Prebuilt { id, .. } => id,
        }
    }

    fn priority(&self) -> i32 {
        match self {
            Self::Declared(decl) => decl.priority,
            Self::Prebuilt { priority, .. } => *priority,
        }
    }
}

/// Builder for an [`OverlaySet`].
pub struct OverlaySetBuilder {
    pending: Vec<PendingOverlay>,
    index_dictionary_contents: bool,
}

impl Default for OverlaySetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlaySetBuilder {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            index_dictionary_contents: true,
        }
    }

    /// Add one declared overlay.
    pub fn overlay(mut self, decl: OverlayDecl) -> Self {
        self.pending.push(PendingOverlay::Declared(decl));
        self
    }

    /// Add every overlay a manifest declares.
    pub fn manifest(mut self, manifest: &OverlayManifest) -> Self {
        for decl in &manifest.overlays {
            self.pending.push(PendingOverlay::Declared(decl.clone()));
        }
        self
    }

    /// Add an overlay from already-opened archives. Used when packs arrive
    /// from memory rather than a directory tree.
    pub fn overlay_archives(
        mut self,
        id: impl Into<String>,
        priority: i32,
        archives: Vec<ArchiveReader>,
    ) -> Self {
        self.pending.push(PendingOverlay::Prebuilt {
            id: id.into(),
            priority,
            archives,
        });
        self
    }

    /// Whether dictionary payloads are opened during indexing so their
    /// declared hashes become index hits. On by default; turning it off
    /// trades resolution coverage for faster mounting.
    pub fn index_dictionary_contents(mut self, on: bool) -> Self {
        self.index_dictionary_contents = on;
        self
    }

    /// Mount everything.
    ///
    /// # Errors
    ///
    /// Duplicate or empty overlay ids, and unreadable overlay roots.
    /// Corrupt archives never fail the build; they are reported instead.
    pub fn build(self) -> Result<(OverlaySet, BuildReport), OverlayError> {
        let mut seen = HashSet::new();
        for pending in &self.pending {
            let id = pending.id();
            if id.is_empty() {
                return Err(ManifestError::EmptyId.into());
            }
            if !seen.insert(id.to_string()) {
                return Err(ManifestError::DuplicateId { id: id.to_string() }.into());
            }
        }

        let mut pending = self.pending;
        pending.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then_with(|| a.id().cmp(b.id()))
        });

        let mut report = BuildReport::default();
        let mut overlays = Vec::with_capacity(pending.len());
        let mut indexes = Vec::with_capacity(pending.len());

        for (slot, entry) in pending.into_iter().enumerate() {
            let (id, root, priority, enabled, archives) = match entry {
                PendingOverlay::Declared(decl) => {
                    let mut archives = Vec::new();
                    if decl.enabled {
                        for path in discover_archives(&decl.root)? {
                            match ArchiveReader::open_file(&path) {
                                Ok(reader) => {
                                    report.archives_opened += 1;
                                    archives.push(reader);
                                }
                                Err(error) => {
                                    warn!(
                                        overlay = %decl.id,
                                        path = %path.display(),
                                        %error,
                                        "skipping unreadable archive"
                                    );
                                    report.skipped.push(SkippedArchive {
                                        path,
                                        reason: error.to_string(),
                                    });
                                }
                            }
                        }
                    }
                    (decl.id, decl.root, decl.priority, decl.enabled, archives)
                }
                PendingOverlay::Prebuilt {
                    id,
                    priority,
                    archives,
                } => {
                    report.archives_opened += archives.len();
                    (id, PathBuf::new(), priority, true, archives)
                }
            };

            let (index, stats) =
                OverlayIndex::build(slot, &archives, self.index_dictionary_contents);
            report.absorb(stats);
            info!(
                overlay = %id,
                priority,
                enabled,
                archives = archives.len(),
                indexed = index.len(),
                "mounted overlay"
            );
            overlays.push(Overlay::new(id, root, priority, enabled, archives));
            indexes.push(index);
        }

        let set = OverlaySet {
            overlays,
            indexes,
            dictionary_tables: DashMap::new(),
        };
        Ok((set, report))
    }
}

/// Collect archive files under a root, sorted by path so mount order is
/// stable across platforms. A root naming a single archive file mounts
/// just that file.
fn discover_archives(root: &Path) -> Result<Vec<PathBuf>, OverlayError> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|source| OverlayError::RootUnreadable {
            path: dir.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| OverlayError::RootUnreadable {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if has_archive_extension(&path) {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

fn has_archive_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case(OsStr::new(ARCHIVE_EXTENSION)))
        .unwrap_or(false)
}

/// The mounted overlay stack, ordered by descending priority.
///
/// All lookups walk slots in order, so slot order is shadowing order.
/// The set is immutable after build and safe to share across threads;
/// dictionary tables are parsed lazily and memoized.
pub struct OverlaySet {
    overlays: Vec<Overlay>,
    indexes: Vec<OverlayIndex>,
    dictionary_tables: DashMap<PackLocation, Arc<DictionaryTable>>,
}

impl std::fmt::Debug for OverlaySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let indexed: usize = self.indexes.iter().map(OverlayIndex::len).sum();
        f.debug_struct("OverlaySet")
            .field("overlay_count", &self.overlays.len())
            .field("indexed_entries", &indexed)
            .field("cached_dictionary_tables", &self.dictionary_tables.len())
            .finish()
    }
}

impl OverlaySet {
    pub fn builder() -> OverlaySetBuilder {
        OverlaySetBuilder::new()
    }

    /// Overlays in priority order, highest first.
    pub fn overlays(&self) -> &[Overlay] {
        &self.overlays
    }

    pub fn overlay(&self, slot: usize) -> Option<&Overlay> {
        self.overlays.get(slot)
    }

    /// Highest-priority indexed location for a content hash.
    pub fn lookup(&self, hash: ContentHash) -> Option<PackLocation> {
        for (slot, overlay) in self.overlays.iter().enumerate() {
            if !overlay.is_enabled() {
                continue;
            }
            if let Some(location) = self.indexes[slot].lookup(hash) {
                return Some(location);
            }
        }
        None
    }

    pub fn archive(&self, location: PackLocation) -> Result<&ArchiveReader, OverlayError> {
        let overlay = self
            .overlays
            .get(location.overlay)
            .ok_or(OverlayError::UnknownOverlay {
                overlay: location.overlay,
            })?;
        overlay
            .archive(location.archive)
            .ok_or(OverlayError::UnknownArchive {
                overlay: location.overlay,
                archive: location.archive,
            })
    }

    pub fn entry(&self, location: PackLocation) -> Result<&ArchiveEntry, OverlayError> {
        let archive = self.archive(location)?;
        archive
            .entry(location.entry)
            .ok_or(OverlayError::Archive(ArchiveError::UnknownEntry {
                index: location.entry,
            }))
    }

    /// Extract the decoded payload at a location.
    pub fn extract(&self, location: PackLocation) -> Result<Vec<u8>, OverlayError> {
        let archive = self.archive(location)?;
        Ok(archive.extract(location.entry, ExtractOptions::decoded())?)
    }

    /// Parse the dictionary at a location, memoizing the table.
    pub fn dictionary_table(
        &self,
        location: PackLocation,
    ) -> Result<Arc<DictionaryTable>, OverlayError> {
        if let Some(table) = self.dictionary_tables.get(&location) {
            return Ok(Arc::clone(&table));
        }
        let payload = self.extract(location)?;
        let table = Arc::new(DictionaryTable::parse(&payload)?);
        self.dictionary_tables.insert(location, Arc::clone(&table));
        Ok(table)
    }

    /// Highest-priority dictionary entry whose stem hash matches.
    pub fn find_dictionary(&self, hash: ContentHash) -> Option<PackLocation> {
        if let Some(location) = self.lookup(hash) {
            if let Ok(entry) = self.entry(location) {
                if is_dictionary(entry.name()) {
                    return Some(location);
                }
            }
        }
        self.scan(hash, |entry| is_dictionary(entry.name()))
    }

    /// Exhaustive stem-hash scan over every file entry in priority order.
    /// Wider than the index: it also covers non-indexable extensions.
    pub fn scan_for_hash(&self, hash: ContentHash) -> Option<PackLocation> {
        self.scan(hash, |_| true)
    }

    fn scan(
        &self,
        hash: ContentHash,
        accept: impl Fn(&ArchiveEntry) -> bool,
    ) -> Option<PackLocation> {
        for (slot, overlay) in self.overlays.iter().enumerate() {
            if !overlay.is_enabled() {
                continue;
            }
            for (archive_slot, archive) in overlay.archives().iter().enumerate() {
                for entry in archive.entries() {
                    if entry.is_file() && entry.name_hash().stem() == hash && accept(entry) {
                        return Some(PackLocation {
                            overlay: slot,
                            archive: archive_slot,
                            entry: entry.index(),
                        });
                    }
                }
            }
        }
        None
    }

    /// Human-readable location description for logs.
    pub fn describe(&self, location: PackLocation) -> String {
        let overlay = match self.overlays.get(location.overlay) {
            Some(overlay) => overlay,
            None => return location.to_string(),
        };
        let archive = match overlay.archive(location.archive) {
            Some(archive) => archive,
            None => return location.to_string(),
        };
        match archive.entry(location.entry) {
            Some(entry) => format!("{}:{}:{}", overlay.id(), archive.name(), entry.path()),
            None => location.to_string(),
        }
    }
}
