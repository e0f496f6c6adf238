//! Wire format for `.wpk` archive containers.
//!
//! An archive is laid out as:
//!
//! | Offset              | Size             | Contents                        |
//! |---------------------|------------------|---------------------------------|
//! | 0                   | 16               | header                          |
//! | 16                  | 16 × entry count | packed entry records            |
//! | 16 + 16 × entries   | name table len   | NUL-terminated entry names      |
//! | sector-aligned      | per entry        | payloads at sector offset × 512 |
//!
//! Header words (little-endian `u32`): format tag `"WPK7"`, entry count,
//! name table length, encryption tag. An encryption tag other than `0` or
//! ASCII `"OPEN"` names a cipher this reader does not implement and fails
//! `open()` immediately.
//!
//! Each entry record is four little-endian words `w0..w3`. The top byte of
//! `w0` selects the entry kind and the low 24 bits are the name-table
//! offset:
//!
//! | Kind byte         | w1          | w2                | w3                      |
//! |-------------------|-------------|-------------------|-------------------------|
//! | `0x00` directory  | child start | child count       | reserved (0)            |
//! | `0x40+f` binary   | stored size | uncompressed size | sector offset           |
//! | `0x80` resource   | stored size | sector offset     | system \| graphics << 16|
//!
//! Binary flag bits: `0x01` compressed, `0x02` encrypted. Resource payloads
//! begin with a 16-byte `"WRS7"` header (magic, version, system flags,
//! graphics flags) that decoded extraction validates and skips.

use bytes::{Buf, Bytes};

use super::error::ArchiveError;

/// ASCII `"WPK7"`, the container format tag.
pub const FORMAT_TAG: u32 = u32::from_le_bytes(*b"WPK7");

/// Encryption tag meaning "no encryption".
pub const ENCRYPTION_NONE: u32 = 0;

/// ASCII `"OPEN"`, an alternate tag meaning "no encryption".
pub const ENCRYPTION_OPEN: u32 = u32::from_le_bytes(*b"OPEN");

/// Header size in bytes.
pub const HEADER_LEN: usize = 16;

/// Packed entry record size in bytes.
pub const ENTRY_RECORD_LEN: usize = 16;

/// Payload sector size; sector offsets are absolute file offsets in these units.
pub const SECTOR_SIZE: u64 = 512;

/// ASCII `"WRS7"`, the resource payload header magic.
pub const RESOURCE_MAGIC: u32 = u32::from_le_bytes(*b"WRS7");

/// Resource payload header size, skipped by decoded extraction.
pub const RESOURCE_HEADER_LEN: usize = 16;

const NAME_OFFSET_MASK: u32 = 0x00FF_FFFF;
const KIND_DIRECTORY: u8 = 0x00;
const KIND_BINARY: u8 = 0x40;
const KIND_RESOURCE: u8 = 0x80;
const BINARY_FLAG_COMPRESSED: u8 = 0x01;
const BINARY_FLAG_ENCRYPTED: u8 = 0x02;

/// Parsed archive header (the format tag itself is validated, not stored).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveHeader {
    pub entry_count: u32,
    pub name_table_len: u32,
    pub encryption_tag: u32,
}

impl ArchiveHeader {
    /// Parse and validate a header from exactly [`HEADER_LEN`] bytes.
    pub fn parse(mut buf: impl Buf) -> Result<Self, ArchiveError> {
        let tag = buf.get_u32_le();
        if tag != FORMAT_TAG {
            return Err(ArchiveError::BadFormatTag { found: tag });
        }
        let entry_count = buf.get_u32_le();
        let name_table_len = buf.get_u32_le();
        let encryption_tag = buf.get_u32_le();
        match encryption_tag {
            ENCRYPTION_NONE | ENCRYPTION_OPEN => {}
            tag => return Err(ArchiveError::UnsupportedEncryption { tag }),
        }
        if entry_count == 0 {
            return Err(ArchiveError::NoEntries);
        }
        Ok(Self {
            entry_count,
            name_table_len,
            encryption_tag,
        })
    }

    /// Encode the header, including the format tag.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&FORMAT_TAG.to_le_bytes());
        out[4..8].copy_from_slice(&self.entry_count.to_le_bytes());
        out[8..12].copy_from_slice(&self.name_table_len.to_le_bytes());
        out[12..16].copy_from_slice(&self.encryption_tag.to_le_bytes());
        out
    }

    /// Total bytes covered by header, entry table and name table.
    pub fn metadata_len(&self) -> u64 {
        HEADER_LEN as u64
            + u64::from(self.entry_count) * ENTRY_RECORD_LEN as u64
            + u64::from(self.name_table_len)
    }
}

/// One packed 16-byte entry record, decoded to wire-level fields.
///
/// Names and paths are resolved later by the reader's tree walk; this type
/// only captures what is physically in the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryRecord {
    Directory {
        name_offset: u32,
        child_start: u32,
        child_count: u32,
    },
    Binary {
        name_offset: u32,
        stored_size: u32,
        uncompressed_size: u32,
        sector_offset: u32,
        compressed: bool,
        encrypted: bool,
    },
    Resource {
        name_offset: u32,
        stored_size: u32,
        sector_offset: u32,
        system_flags: u16,
        graphics_flags: u16,
    },
}

impl EntryRecord {
    /// Decode one record from exactly [`ENTRY_RECORD_LEN`] bytes.
    ///
    /// `index` is the record's position in the entry table, used for error
    /// context only.
    pub fn parse(index: usize, mut buf: impl Buf) -> Result<Self, ArchiveError> {
        let w0 = buf.get_u32_le();
        let w1 = buf.get_u32_le();
        let w2 = buf.get_u32_le();
        let w3 = buf.get_u32_le();
        let name_offset = w0 & NAME_OFFSET_MASK;
        let kind = (w0 >> 24) as u8;
        match kind {
            KIND_DIRECTORY => Ok(Self::Directory {
                name_offset,
                child_start: w1,
                child_count: w2,
            }),
            0x40..=0x43 => Ok(Self::Binary {
                name_offset,
                stored_size: w1,
                uncompressed_size: w2,
                sector_offset: w3,
                compressed: kind & BINARY_FLAG_COMPRESSED != 0,
                encrypted: kind & BINARY_FLAG_ENCRYPTED != 0,
            }),
            KIND_RESOURCE => Ok(Self::Resource {
                name_offset,
                stored_size: w1,
                sector_offset: w2,
                system_flags: (w3 & 0xFFFF) as u16,
                graphics_flags: (w3 >> 16) as u16,
            }),
            tag => Err(ArchiveError::UnknownEntryKind { index, tag }),
        }
    }

    /// Encode the record back to its packed form.
    pub fn encode(&self) -> [u8; ENTRY_RECORD_LEN] {
        let (w0, w1, w2, w3) = match *self {
            Self::Directory {
                name_offset,
                child_start,
                child_count,
            } => (
                (name_offset & NAME_OFFSET_MASK) | (u32::from(KIND_DIRECTORY) << 24),
                child_start,
                child_count,
                0,
            ),
            Self::Binary {
                name_offset,
                stored_size,
                uncompressed_size,
                sector_offset,
                compressed,
                encrypted,
            } => {
                let mut kind = KIND_BINARY;
                if compressed {
                    kind |= BINARY_FLAG_COMPRESSED;
                }
                if encrypted {
                    kind |= BINARY_FLAG_ENCRYPTED;
                }
                (
                    (name_offset & NAME_OFFSET_MASK) | (u32::from(kind) << 24),
                    stored_size,
                    uncompressed_size,
                    sector_offset,
                )
            }
            Self::Resource {
                name_offset,
                stored_size,
                sector_offset,
                system_flags,
                graphics_flags,
            } => (
                (name_offset & NAME_OFFSET_MASK) | (u32::from(KIND_RESOURCE) << 24),
                stored_size,
                sector_offset,
                u32::from(system_flags) | (u32::from(graphics_flags) << 16),
            ),
        };
        let mut out = [0u8; ENTRY_RECORD_LEN];
        out[0..4].copy_from_slice(&w0.to_le_bytes());
        out[4..8].copy_from_slice(&w1.to_le_bytes());
        out[8..12].copy_from_slice(&w2.to_le_bytes());
        out[12..16].copy_from_slice(&w3.to_le_bytes());
        out
    }

    /// The record's offset into the name table.
    pub fn name_offset(&self) -> u32 {
        match *self {
            Self::Directory { name_offset, .. }
            | Self::Binary { name_offset, .. }
            | Self::Resource { name_offset, .. } => name_offset,
        }
    }
}

/// The archive's name table: NUL-terminated UTF-8 names addressed by offset.
#[derive(Debug, Clone)]
pub struct NameTable {
    data: Bytes,
}

impl NameTable {
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Resolve the name stored at `offset`.
    pub fn name_at(&self, offset: u32) -> Result<&str, ArchiveError> {
        let start = offset as usize;
        if start >= self.data.len() {
            return Err(ArchiveError::BadNameOffset { offset });
        }
        let rest = &self.data[start..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(ArchiveError::UnterminatedName { offset })?;
        std::str::from_utf8(&rest[..nul]).map_err(|_| ArchiveError::InvalidName { offset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = ArchiveHeader {
            entry_count: 7,
            name_table_len: 120,
            encryption_tag: ENCRYPTION_NONE,
        };
        let bytes = header.encode();
        let parsed = ArchiveHeader::parse(&bytes[..]).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.metadata_len(), 16 + 7 * 16 + 120);
    }

    #[test]
    fn test_header_rejects_bad_tag() {
        let mut bytes = ArchiveHeader {
            entry_count: 1,
            name_table_len: 1,
            encryption_tag: ENCRYPTION_NONE,
        }
        .encode();
        bytes[0..4].copy_from_slice(b"NOPE");
        let err = ArchiveHeader::parse(&bytes[..]).unwrap_err();
        assert!(matches!(err, ArchiveError::BadFormatTag { .. }));
    }

    #[test]
    fn test_header_rejects_unknown_cipher() {
        let mut bytes = ArchiveHeader {
            entry_count: 1,
            name_table_len: 1,
            encryption_tag: ENCRYPTION_NONE,
        }
        .encode();
        bytes[12..16].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        let err = ArchiveHeader::parse(&bytes[..]).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::UnsupportedEncryption { tag: 0xDEAD_BEEF }
        ));
    }

    #[test]
    fn test_header_accepts_open_tag() {
        let header = ArchiveHeader {
            entry_count: 1,
            name_table_len: 1,
            encryption_tag: ENCRYPTION_OPEN,
        };
        let parsed = ArchiveHeader::parse(&header.encode()[..]).unwrap();
        assert_eq!(parsed.encryption_tag, ENCRYPTION_OPEN);
    }

    #[test]
    fn test_header_rejects_zero_entries() {
        let header = ArchiveHeader {
            entry_count: 0,
            name_table_len: 1,
            encryption_tag: ENCRYPTION_NONE,
        };
        let err = ArchiveHeader::parse(&header.encode()[..]).unwrap_err();
        assert!(matches!(err, ArchiveError::NoEntries));
    }

    #[test]
    fn test_directory_record_roundtrip() {
        let record = EntryRecord::Directory {
            name_offset: 42,
            child_start: 3,
            child_count: 9,
        };
        let parsed = EntryRecord::parse(0, &record.encode()[..]).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_binary_record_roundtrip_with_flags() {
        for (compressed, encrypted) in [(false, false), (true, false), (false, true), (true, true)]
        {
            let record = EntryRecord::Binary {
                name_offset: 0x00AB_CDEF,
                stored_size: 1000,
                uncompressed_size: 4000,
                sector_offset: 8,
                compressed,
                encrypted,
            };
            let parsed = EntryRecord::parse(1, &record.encode()[..]).unwrap();
            assert_eq!(parsed, record);
        }
    }

    #[test]
    fn test_resource_record_splits_flag_word() {
        let record = EntryRecord::Resource {
            name_offset: 7,
            stored_size: 512,
            sector_offset: 4,
            system_flags: 0x1234,
            graphics_flags: 0xABCD,
        };
        let bytes = record.encode();
        let w3 = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        assert_eq!(w3, 0xABCD_1234);
        assert_eq!(EntryRecord::parse(2, &bytes[..]).unwrap(), record);
    }

    #[test]
    fn test_unknown_kind_byte_is_rejected() {
        let mut bytes = [0u8; ENTRY_RECORD_LEN];
        bytes[3] = 0xC1;
        let err = EntryRecord::parse(5, &bytes[..]).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::UnknownEntryKind { index: 5, tag: 0xC1 }
        ));
    }

    #[test]
    fn test_name_table_lookup() {
        let table = NameTable::new(Bytes::from_static(b"\0root\0props\0rock01.wdr\0"));
        assert_eq!(table.name_at(0).unwrap(), "");
        assert_eq!(table.name_at(1).unwrap(), "root");
        assert_eq!(table.name_at(6).unwrap(), "props");
        assert_eq!(table.name_at(12).unwrap(), "rock01.wdr");
    }

    #[test]
    fn test_name_table_rejects_out_of_range_offset() {
        let table = NameTable::new(Bytes::from_static(b"\0a\0"));
        let err = table.name_at(64).unwrap_err();
        assert!(matches!(err, ArchiveError::BadNameOffset { offset: 64 }));
    }

    #[test]
    fn test_name_table_rejects_missing_terminator() {
        let table = NameTable::new(Bytes::from_static(b"\0abc"));
        let err = table.name_at(1).unwrap_err();
        assert!(matches!(err, ArchiveError::UnterminatedName { offset: 1 }));
    }

    #[test]
    fn test_name_table_rejects_invalid_utf8() {
        let table = NameTable::new(Bytes::from_static(b"\0\xFF\xFE\0"));
        let err = table.name_at(1).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidName { offset: 1 }));
    }
}
