//! In-memory archive entry model.
//!
//! Wire records ([`super::format::EntryRecord`]) carry only offsets; the
//! reader's tree walk resolves names, builds normalized paths and computes
//! identities, producing these entries.

use crate::hash::NameHash;

/// A parsed archive entry with resolved name, path and identity.
#[derive(Debug, Clone)]
pub enum ArchiveEntry {
    Directory(DirectoryEntry),
    Binary(BinaryEntry),
    Resource(ResourceEntry),
}

/// Directory entry; children occupy the contiguous index range
/// `[child_start, child_start + child_count)`.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub index: usize,
    pub name: String,
    pub path: String,
    pub name_hash: NameHash,
    pub child_start: u32,
    pub child_count: u32,
}

/// Plain file entry, optionally deflate-compressed.
#[derive(Debug, Clone)]
pub struct BinaryEntry {
    pub index: usize,
    pub name: String,
    pub path: String,
    pub name_hash: NameHash,
    pub stored_size: u32,
    pub uncompressed_size: u32,
    pub sector_offset: u32,
    pub compressed: bool,
    pub encrypted: bool,
}

/// Paged resource entry; the payload itself starts with a 16-byte resource
/// header carrying full-width flag words.
#[derive(Debug, Clone)]
pub struct ResourceEntry {
    pub index: usize,
    pub name: String,
    pub path: String,
    pub name_hash: NameHash,
    pub stored_size: u32,
    pub sector_offset: u32,
    pub system_flags: u16,
    pub graphics_flags: u16,
}

impl ArchiveEntry {
    pub fn index(&self) -> usize {
        match self {
            Self::Directory(e) => e.index,
            Self::Binary(e) => e.index,
            Self::Resource(e) => e.index,
        }
    }

    /// The entry name as stored in the name table.
    pub fn name(&self) -> &str {
        match self {
            Self::Directory(e) => &e.name,
            Self::Binary(e) => &e.name,
            Self::Resource(e) => &e.name,
        }
    }

    /// Normalized path: lowercase, backslash-separated, empty for the root.
    pub fn path(&self) -> &str {
        match self {
            Self::Directory(e) => &e.path,
            Self::Binary(e) => &e.path,
            Self::Resource(e) => &e.path,
        }
    }

    pub fn name_hash(&self) -> NameHash {
        match self {
            Self::Directory(e) => e.name_hash,
            Self::Binary(e) => e.name_hash,
            Self::Resource(e) => e.name_hash,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Self::Directory(_))
    }

    pub fn is_file(&self) -> bool {
        !self.is_directory()
    }

    /// The name's extension, if any (case as stored; compare
    /// case-insensitively).
    pub fn extension(&self) -> Option<&str> {
        self.name().rsplit_once('.').map(|(_, ext)| ext)
    }

    pub fn as_directory(&self) -> Option<&DirectoryEntry> {
        match self {
            Self::Directory(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&BinaryEntry> {
        match self {
            Self::Binary(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<&ResourceEntry> {
        match self {
            Self::Resource(e) => Some(e),
            _ => None,
        }
    }
}
