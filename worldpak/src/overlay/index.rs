//! Per-overlay hash index.
//!
//! The index maps a content hash to the pack location that satisfies it
//! within one overlay. It covers the stem hash of every indexable entry
//! plus, when enabled, the hashes declared inside dictionary payloads.
//! Within one overlay the later location wins on collision; across
//! overlays priority is decided by the set, not here.

use std::collections::HashMap;

use thiserror::Error;
use tracing::warn;

use crate::archive::{ArchiveError, ArchiveReader, ExtractOptions};
use crate::hash::ContentHash;

use super::dictionary::{DictionaryError, DictionaryTable};
use super::source::PackLocation;

/// Entry name extensions that participate in hash indexing.
pub const INDEXABLE_EXTENSIONS: [&str; 3] = ["wdr", "wdd", "wtd"];

/// The subset of indexable extensions whose payloads are dictionaries.
pub const DICTIONARY_EXTENSIONS: [&str; 2] = ["wdd", "wtd"];

fn extension_of(name: &str) -> Option<&str> {
    name.rsplit_once('.').map(|(_, ext)| ext)
}

pub fn is_indexable(name: &str) -> bool {
    extension_of(name)
        .map(|ext| INDEXABLE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

pub fn is_dictionary(name: &str) -> bool {
    extension_of(name)
        .map(|ext| DICTIONARY_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Counters produced while building one overlay's index.
#[derive(Debug, Default, Clone, Copy)]
pub struct IndexBuildStats {
    pub indexed_entries: usize,
    pub dictionaries_scanned: usize,
    pub dictionary_failures: usize,
    pub duplicate_hashes: usize,
}

#[derive(Debug, Error)]
enum IndexError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Dictionary(#[from] DictionaryError),
}

/// Hash index for one overlay.
#[derive(Default)]
pub struct OverlayIndex {
    by_hash: HashMap<ContentHash, PackLocation>,
}

impl OverlayIndex {
    /// Index the archives of the overlay mounted at `overlay`.
    ///
    /// Unreadable dictionary payloads downgrade to a warning; the entry
    /// itself stays indexed by its own stem hash.
    pub fn build(
        overlay: usize,
        archives: &[ArchiveReader],
        index_dictionary_contents: bool,
    ) -> (Self, IndexBuildStats) {
        let mut index = Self::default();
        let mut stats = IndexBuildStats::default();

        for (archive_slot, archive) in archives.iter().enumerate() {
            for entry in archive.entries() {
                if !entry.is_file() || !is_indexable(entry.name()) {
                    continue;
                }
                let location = PackLocation {
                    overlay,
                    archive: archive_slot,
                    entry: entry.index(),
                };
                index.insert(archive.name(), entry.name_hash().stem(), location, &mut stats);
                stats.indexed_entries += 1;

                if index_dictionary_contents && is_dictionary(entry.name()) {
                    stats.dictionaries_scanned += 1;
                    match declared_hashes(archive, entry.index()) {
                        Ok(declared) => {
                            for hash in declared {
                                index.insert(archive.name(), hash, location, &mut stats);
                            }
                        }
                        Err(error) => {
                            stats.dictionary_failures += 1;
                            warn!(
                                archive = archive.name(),
                                entry = entry.path(),
                                %error,
                                "skipping unreadable dictionary payload"
                            );
                        }
                    }
                }
            }
        }

        (index, stats)
    }

    fn insert(
        &mut self,
        archive: &str,
        hash: ContentHash,
        location: PackLocation,
        stats: &mut IndexBuildStats,
    ) {
        if let Some(previous) = self.by_hash.insert(hash, location) {
            if previous != location {
                stats.duplicate_hashes += 1;
                warn!(
                    archive,
                    %hash,
                    %previous,
                    %location,
                    "hash indexed twice within overlay, later location wins"
                );
            }
        }
    }

    pub fn lookup(&self, hash: ContentHash) -> Option<PackLocation> {
        self.by_hash.get(&hash).copied()
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }
}

fn declared_hashes(archive: &ArchiveReader, entry: usize) -> Result<Vec<ContentHash>, IndexError> {
    let payload = archive.extract(entry, ExtractOptions::decoded())?;
    let table = DictionaryTable::parse(&payload)?;
    Ok(table.declared().to_vec())
}
