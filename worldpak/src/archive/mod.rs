//! Content-addressed archive reading.
//!
//! An archive is a single file with a fixed layout:
//!
//! ```text
//! +--------------------+  offset 0
//! | header             |  format tag, counts, encryption tag
//! +--------------------+
//! | entry records      |  fixed-width, index order, tree via child ranges
//! +--------------------+
//! | name table         |  NUL-terminated UTF-8 names
//! +--------------------+
//! | payload sectors    |  addressed as sector_offset * SECTOR_SIZE
//! +--------------------+
//! ```
//!
//! Submodules:
//!
//! | Module   | Responsibility                                      |
//! |----------|-----------------------------------------------------|
//! | `format` | Wire-level header, entry record and name table      |
//! | `source` | Positional byte-range access (file or memory)       |
//! | `codec`  | Payload decompression                               |
//! | `entry`  | Decoded entry model with names, paths and hashes    |
//! | `reader` | Open, validate, look up and extract                 |
//! | `error`  | Archive error type                                  |

pub mod codec;
pub mod entry;
pub mod error;
pub mod format;
pub mod reader;
pub mod source;

pub use codec::{CodecError, DeflateCodec, PayloadCodec};
pub use entry::{ArchiveEntry, BinaryEntry, DirectoryEntry, ResourceEntry};
pub use error::ArchiveError;
pub use format::{ArchiveHeader, EntryRecord, SECTOR_SIZE};
pub use reader::{normalize_path, ArchiveReader, ExtractOptions};
pub use source::{ByteRangeReader, FileRangeReader, MemoryRangeReader};
