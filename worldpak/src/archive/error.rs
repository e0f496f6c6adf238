//! Error types for archive parsing and extraction.

use thiserror::Error;

use super::codec::CodecError;

/// Errors raised while opening or reading an archive.
///
/// Format-level variants (`BadFormatTag`, `Truncated`, the malformed-record
/// and name-table families) mean the container is rejected as a whole;
/// overlay loading treats them as "skip this archive and keep going".
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The file does not start with the `"WPK7"` tag.
    #[error("bad format tag {found:#010x}")]
    BadFormatTag { found: u32 },

    /// The header names a cipher this reader does not implement.
    #[error("unsupported encryption tag {tag:#010x}")]
    UnsupportedEncryption { tag: u32 },

    /// The entry is flagged encrypted; per-entry ciphers are not implemented.
    #[error("entry '{path}' is encrypted and cannot be extracted")]
    EncryptedEntry { path: String },

    /// A section extends past the end of the source.
    #[error("archive truncated: {section} needs {needed} bytes, {available} available")]
    Truncated {
        section: &'static str,
        needed: u64,
        available: u64,
    },

    /// The archive declares zero entries; entry 0 must be the root directory.
    #[error("archive has no entries")]
    NoEntries,

    /// Entry 0 is not a directory.
    #[error("entry 0 is not a directory")]
    RootNotDirectory,

    /// A record carries a kind byte outside the known set.
    #[error("entry {index} has unknown kind byte {tag:#04x}")]
    UnknownEntryKind { index: usize, tag: u8 },

    /// A directory's child range points outside the entry table.
    #[error("entry {index} child range {child_start}+{child_count} exceeds {entry_count} entries")]
    ChildRangeOutOfBounds {
        index: usize,
        child_start: u32,
        child_count: u32,
        entry_count: u32,
    },

    /// An entry is referenced by more than one directory (or the walk loops).
    #[error("entry {index} is claimed by more than one directory")]
    EntryClaimedTwice { index: usize },

    /// Entries exist that no directory references.
    #[error("{count} entries are unreachable from the root directory")]
    OrphanEntries { count: usize },

    /// A record's name offset points outside the name table.
    #[error("name offset {offset} is outside the name table")]
    BadNameOffset { offset: u32 },

    /// No NUL terminator between the name offset and the end of the table.
    #[error("name at offset {offset} is not NUL-terminated")]
    UnterminatedName { offset: u32 },

    /// The name bytes are not valid UTF-8.
    #[error("name at offset {offset} is not valid UTF-8")]
    InvalidName { offset: u32 },

    /// Entry index out of range for this archive.
    #[error("archive has no entry {index}")]
    UnknownEntry { index: usize },

    /// Path lookup failed.
    #[error("archive has no entry at path '{path}'")]
    UnknownPath { path: String },

    /// Directories have no payload to extract.
    #[error("entry '{path}' is a directory and has no payload")]
    DirectoryPayload { path: String },

    /// A resource payload does not start with the `"WRS7"` header.
    #[error("entry '{path}' has bad resource header magic {found:#010x}")]
    BadResourceHeader { path: String, found: u32 },

    /// Payload decoding failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Underlying source I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
