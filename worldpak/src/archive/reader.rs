//! Archive opening, lookup and extraction.
//!
//! `open()` validates the header, parses the entry and name tables, and
//! walks the directory tree from entry 0 to build normalized paths and a
//! path index. Payload bytes are only touched by `extract()`.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::hash::NameHash;

use super::codec::{DeflateCodec, PayloadCodec};
use super::entry::{ArchiveEntry, BinaryEntry, DirectoryEntry, ResourceEntry};
use super::error::ArchiveError;
use super::format::{
    ArchiveHeader, EntryRecord, NameTable, ENTRY_RECORD_LEN, HEADER_LEN, RESOURCE_HEADER_LEN,
    RESOURCE_MAGIC, SECTOR_SIZE,
};
use super::source::{ByteRangeReader, FileRangeReader, MemoryRangeReader};

/// Extraction options.
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    /// Decode payloads: inflate compressed binaries, validate and strip
    /// resource headers. When false the stored bytes come back verbatim.
    pub decode: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self { decode: true }
    }
}

impl ExtractOptions {
    /// Decoded payload (the default).
    pub fn decoded() -> Self {
        Self { decode: true }
    }

    /// Stored bytes verbatim.
    pub fn raw() -> Self {
        Self { decode: false }
    }
}

/// Normalize a lookup path: lowercase, both separators accepted, empty
/// segments dropped. The root is the empty path.
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for part in path.split(['/', '\\']).filter(|p| !p.is_empty()) {
        if !out.is_empty() {
            out.push('\\');
        }
        for ch in part.chars() {
            out.push(ch.to_ascii_lowercase());
        }
    }
    out
}

/// A parsed archive with on-demand payload extraction.
///
/// Readers are safe to share across threads; extraction uses positional
/// reads with no shared cursor.
pub struct ArchiveReader {
    name: String,
    source: Box<dyn ByteRangeReader>,
    codec: Arc<dyn PayloadCodec>,
    header: ArchiveHeader,
    entries: Vec<ArchiveEntry>,
    paths: HashMap<String, usize>,
}

impl std::fmt::Debug for ArchiveReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveReader")
            .field("name", &self.name)
            .field("header", &self.header)
            .field("entry_count", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl ArchiveReader {
    /// Open an archive file with the default codec.
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let source = FileRangeReader::open(path)?;
        Self::open(name, Box::new(source))
    }

    /// Open an in-memory archive with the default codec.
    pub fn open_bytes(
        name: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Result<Self, ArchiveError> {
        Self::open(name, Box::new(MemoryRangeReader::new(data)))
    }

    /// Open an archive from any byte-range source with the default codec.
    pub fn open(
        name: impl Into<String>,
        source: Box<dyn ByteRangeReader>,
    ) -> Result<Self, ArchiveError> {
        Self::open_with_codec(name, source, Arc::new(DeflateCodec))
    }

    /// Open with an explicit payload codec.
    pub fn open_with_codec(
        name: impl Into<String>,
        source: Box<dyn ByteRangeReader>,
        codec: Arc<dyn PayloadCodec>,
    ) -> Result<Self, ArchiveError> {
        let name = name.into();
        let available = source.len();
        if available < HEADER_LEN as u64 {
            return Err(ArchiveError::Truncated {
                section: "header",
                needed: HEADER_LEN as u64,
                available,
            });
        }
        let mut header_buf = [0u8; HEADER_LEN];
        source.read_at(0, &mut header_buf)?;
        let header = ArchiveHeader::parse(&header_buf[..])?;
        if header.metadata_len() > available {
            return Err(ArchiveError::Truncated {
                section: "entry and name tables",
                needed: header.metadata_len(),
                available,
            });
        }

        let table_len = header.entry_count as usize * ENTRY_RECORD_LEN;
        let mut table = vec![0u8; table_len];
        source.read_at(HEADER_LEN as u64, &mut table)?;
        let mut records = Vec::with_capacity(header.entry_count as usize);
        for index in 0..header.entry_count as usize {
            let start = index * ENTRY_RECORD_LEN;
            records.push(EntryRecord::parse(
                index,
                &table[start..start + ENTRY_RECORD_LEN],
            )?);
        }

        let mut names = vec![0u8; header.name_table_len as usize];
        source.read_at(HEADER_LEN as u64 + table_len as u64, &mut names)?;
        let names = NameTable::new(Bytes::from(names));

        let (entries, paths) = Self::walk(&name, &records, &names)?;

        debug!(archive = %name, entries = entries.len(), "opened archive");

        Ok(Self {
            name,
            source,
            codec,
            header,
            entries,
            paths,
        })
    }

    /// Build entries and the path index by walking the tree from entry 0.
    ///
    /// Validates the tree shape: child ranges stay in bounds and every
    /// non-root entry is claimed by exactly one directory.
    fn walk(
        archive: &str,
        records: &[EntryRecord],
        names: &NameTable,
    ) -> Result<(Vec<ArchiveEntry>, HashMap<String, usize>), ArchiveError> {
        let entry_count = records.len();
        if !matches!(records[0], EntryRecord::Directory { .. }) {
            return Err(ArchiveError::RootNotDirectory);
        }

        let mut slots: Vec<Option<ArchiveEntry>> = vec![None; entry_count];
        let mut paths: HashMap<String, usize> = HashMap::with_capacity(entry_count);
        let mut claimed = vec![false; entry_count];
        claimed[0] = true;

        let mut queue: VecDeque<(usize, String)> = VecDeque::new();
        queue.push_back((0, String::new()));

        while let Some((index, parent_path)) = queue.pop_front() {
            let record = &records[index];
            let name = names.name_at(record.name_offset())?.to_string();
            let lower = name.to_ascii_lowercase();
            let path = if parent_path.is_empty() {
                lower
            } else {
                format!("{parent_path}\\{lower}")
            };
            let name_hash = NameHash::of(&name);

            let entry = match *record {
                EntryRecord::Directory {
                    child_start,
                    child_count,
                    ..
                } => {
                    let start = child_start as usize;
                    let end = start
                        .checked_add(child_count as usize)
                        .filter(|&end| end <= entry_count)
                        .ok_or(ArchiveError::ChildRangeOutOfBounds {
                            index,
                            child_start,
                            child_count,
                            entry_count: entry_count as u32,
                        })?;
                    for child in start..end {
                        if claimed[child] {
                            return Err(ArchiveError::EntryClaimedTwice { index: child });
                        }
                        claimed[child] = true;
                        queue.push_back((child, path.clone()));
                    }
                    ArchiveEntry::Directory(DirectoryEntry {
                        index,
                        name,
                        path: path.clone(),
                        name_hash,
                        child_start,
                        child_count,
                    })
                }
                EntryRecord::Binary {
                    stored_size,
                    uncompressed_size,
                    sector_offset,
                    compressed,
                    encrypted,
                    ..
                } => ArchiveEntry::Binary(BinaryEntry {
                    index,
                    name,
                    path: path.clone(),
                    name_hash,
                    stored_size,
                    uncompressed_size,
                    sector_offset,
                    compressed,
                    encrypted,
                }),
                EntryRecord::Resource {
                    stored_size,
                    sector_offset,
                    system_flags,
                    graphics_flags,
                    ..
                } => ArchiveEntry::Resource(ResourceEntry {
                    index,
                    name,
                    path: path.clone(),
                    name_hash,
                    stored_size,
                    sector_offset,
                    system_flags,
                    graphics_flags,
                }),
            };

            if let Some(previous) = paths.insert(path, index) {
                warn!(
                    archive,
                    path = entry.path(),
                    previous,
                    index,
                    "duplicate entry path, later entry wins"
                );
            }
            slots[index] = Some(entry);
        }

        let orphans = slots.iter().filter(|slot| slot.is_none()).count();
        if orphans > 0 {
            return Err(ArchiveError::OrphanEntries { count: orphans });
        }
        let entries: Vec<ArchiveEntry> = slots.into_iter().flatten().collect();
        Ok((entries, paths))
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Display name of the archive (file name for file-backed archives).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&ArchiveEntry> {
        self.entries.get(index)
    }

    /// The root directory entry (entry 0).
    pub fn root(&self) -> &ArchiveEntry {
        &self.entries[0]
    }

    /// Case-insensitive, separator-normalized path lookup.
    pub fn entry_by_path(&self, path: &str) -> Option<&ArchiveEntry> {
        let normalized = normalize_path(path);
        self.paths.get(&normalized).map(|&index| &self.entries[index])
    }

    /// The contiguous child slice of a directory entry.
    pub fn children(&self, dir: &DirectoryEntry) -> &[ArchiveEntry] {
        let start = dir.child_start as usize;
        let end = start + dir.child_count as usize;
        &self.entries[start..end]
    }

    // ========================================================================
    // Extraction
    // ========================================================================

    /// Extract an entry's payload.
    ///
    /// # Errors
    ///
    /// `DirectoryPayload` for directories, `EncryptedEntry` for entries
    /// flagged encrypted, `Truncated` when the payload range exceeds the
    /// source, `BadResourceHeader`/`Codec` when decoding fails.
    pub fn extract(&self, index: usize, options: ExtractOptions) -> Result<Vec<u8>, ArchiveError> {
        let entry = self
            .entry(index)
            .ok_or(ArchiveError::UnknownEntry { index })?;
        match entry {
            ArchiveEntry::Directory(dir) => Err(ArchiveError::DirectoryPayload {
                path: dir.path.clone(),
            }),
            ArchiveEntry::Binary(bin) => self.extract_binary(bin, options),
            ArchiveEntry::Resource(res) => self.extract_resource(res, options),
        }
    }

    /// Extract by normalized path.
    pub fn extract_path(
        &self,
        path: &str,
        options: ExtractOptions,
    ) -> Result<Vec<u8>, ArchiveError> {
        let entry = self
            .entry_by_path(path)
            .ok_or_else(|| ArchiveError::UnknownPath {
                path: path.to_string(),
            })?;
        self.extract(entry.index(), options)
    }

    fn read_stored(&self, sector_offset: u32, stored_size: u32) -> Result<Vec<u8>, ArchiveError> {
        let offset = u64::from(sector_offset) * SECTOR_SIZE;
        let needed = offset + u64::from(stored_size);
        let available = self.source.len();
        if needed > available {
            return Err(ArchiveError::Truncated {
                section: "payload",
                needed,
                available,
            });
        }
        let mut buf = vec![0u8; stored_size as usize];
        self.source.read_at(offset, &mut buf)?;
        Ok(buf)
    }

    fn extract_binary(
        &self,
        entry: &BinaryEntry,
        options: ExtractOptions,
    ) -> Result<Vec<u8>, ArchiveError> {
        if entry.encrypted {
            return Err(ArchiveError::EncryptedEntry {
                path: entry.path.clone(),
            });
        }
        let stored = self.read_stored(entry.sector_offset, entry.stored_size)?;
        if !options.decode || !entry.compressed {
            return Ok(stored);
        }
        Ok(self
            .codec
            .decompress(&stored, Some(entry.uncompressed_size as usize))?)
    }

    fn extract_resource(
        &self,
        entry: &ResourceEntry,
        options: ExtractOptions,
    ) -> Result<Vec<u8>, ArchiveError> {
        let stored = self.read_stored(entry.sector_offset, entry.stored_size)?;
        if !options.decode {
            return Ok(stored);
        }
        if stored.len() < RESOURCE_HEADER_LEN {
            return Err(ArchiveError::Truncated {
                section: "resource header",
                needed: RESOURCE_HEADER_LEN as u64,
                available: stored.len() as u64,
            });
        }
        let magic = u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]);
        if magic != RESOURCE_MAGIC {
            return Err(ArchiveError::BadResourceHeader {
                path: entry.path.clone(),
                found: magic,
            });
        }
        Ok(self.codec.decompress(&stored[RESOURCE_HEADER_LEN..], None)?)
    }
}
