//! In-memory archive fixtures for unit tests.
//!
//! `ArchiveBuilder` lays out a minimal but wire-correct archive: header,
//! entry records in index order, name table, then sector-aligned payloads
//! starting at a fixed base sector so metadata never collides with data.

use std::io::Write;

use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::archive::format::{
    ArchiveHeader, EntryRecord, ENCRYPTION_NONE, RESOURCE_MAGIC, SECTOR_SIZE,
};
use crate::hash::ContentHash;
use crate::overlay::dictionary::DICTIONARY_MAGIC;

/// First sector of the payload region. Metadata in test archives is tiny,
/// so sector 16 (byte 8192) leaves plenty of headroom.
const PAYLOAD_BASE_SECTOR: u32 = 16;

pub(crate) fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Encode a dictionary payload: magic, parent hash (0 for none), declared
/// hash count and list, then the opaque body.
pub(crate) fn dictionary_payload(
    parent: Option<ContentHash>,
    declared: &[ContentHash],
    body: &[u8],
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&DICTIONARY_MAGIC.to_le_bytes());
    out.extend_from_slice(&parent.map_or(0, |h| h.raw()).to_le_bytes());
    out.extend_from_slice(&(declared.len() as u32).to_le_bytes());
    for hash in declared {
        out.extend_from_slice(&hash.raw().to_le_bytes());
    }
    out.extend_from_slice(body);
    out
}

pub(crate) struct ArchiveBuilder {
    records: Vec<EntryRecord>,
    names: Vec<u8>,
    payload: Vec<u8>,
    encryption_tag: u32,
}

impl ArchiveBuilder {
    pub(crate) fn new() -> Self {
        Self {
            records: Vec::new(),
            names: Vec::new(),
            payload: Vec::new(),
            encryption_tag: ENCRYPTION_NONE,
        }
    }

    pub(crate) fn with_encryption(mut self, tag: u32) -> Self {
        self.encryption_tag = tag;
        self
    }

    fn add_name(&mut self, name: &str) -> u32 {
        let offset = self.names.len() as u32;
        self.names.extend_from_slice(name.as_bytes());
        self.names.push(0);
        offset
    }

    /// Append stored bytes at the next sector boundary, returning the sector.
    fn push_payload(&mut self, bytes: &[u8]) -> u32 {
        let sector_len = SECTOR_SIZE as usize;
        let pad = (sector_len - self.payload.len() % sector_len) % sector_len;
        self.payload.extend(std::iter::repeat(0u8).take(pad));
        let sector = PAYLOAD_BASE_SECTOR + (self.payload.len() / sector_len) as u32;
        self.payload.extend_from_slice(bytes);
        sector
    }

    pub(crate) fn dir(&mut self, name: &str, child_start: u32, child_count: u32) -> usize {
        let name_offset = self.add_name(name);
        self.records.push(EntryRecord::Directory {
            name_offset,
            child_start,
            child_count,
        });
        self.records.len() - 1
    }

    pub(crate) fn binary(&mut self, name: &str, data: &[u8], compress: bool) -> usize {
        let name_offset = self.add_name(name);
        let uncompressed_size = data.len() as u32;
        let stored = if compress { deflate(data) } else { data.to_vec() };
        let sector_offset = self.push_payload(&stored);
        self.records.push(EntryRecord::Binary {
            name_offset,
            stored_size: stored.len() as u32,
            uncompressed_size,
            sector_offset,
            compressed: compress,
            encrypted: false,
        });
        self.records.len() - 1
    }

    pub(crate) fn binary_encrypted(&mut self, name: &str, data: &[u8]) -> usize {
        let name_offset = self.add_name(name);
        let sector_offset = self.push_payload(data);
        self.records.push(EntryRecord::Binary {
            name_offset,
            stored_size: data.len() as u32,
            uncompressed_size: data.len() as u32,
            sector_offset,
            compressed: false,
            encrypted: true,
        });
        self.records.len() - 1
    }

    /// A binary record pointing at an arbitrary sector, with no payload
    /// written. Useful for truncation tests.
    pub(crate) fn binary_at_sector(&mut self, name: &str, stored_size: u32, sector: u32) -> usize {
        let name_offset = self.add_name(name);
        self.records.push(EntryRecord::Binary {
            name_offset,
            stored_size,
            uncompressed_size: stored_size,
            sector_offset: sector,
            compressed: false,
            encrypted: false,
        });
        self.records.len() - 1
    }

    /// A resource entry with a well-formed header and deflated body.
    pub(crate) fn resource(
        &mut self,
        name: &str,
        body: &[u8],
        system_flags: u16,
        graphics_flags: u16,
    ) -> usize {
        let mut stored = Vec::new();
        stored.extend_from_slice(&RESOURCE_MAGIC.to_le_bytes());
        stored.extend_from_slice(&1u32.to_le_bytes());
        stored.extend_from_slice(&u32::from(system_flags).to_le_bytes());
        stored.extend_from_slice(&u32::from(graphics_flags).to_le_bytes());
        stored.extend_from_slice(&deflate(body));
        self.resource_stored(name, &stored, system_flags, graphics_flags)
    }

    /// A resource entry whose stored bytes are taken verbatim.
    pub(crate) fn resource_stored(
        &mut self,
        name: &str,
        stored: &[u8],
        system_flags: u16,
        graphics_flags: u16,
    ) -> usize {
        let name_offset = self.add_name(name);
        let sector_offset = self.push_payload(stored);
        self.records.push(EntryRecord::Resource {
            name_offset,
            stored_size: stored.len() as u32,
            sector_offset,
            system_flags,
            graphics_flags,
        });
        self.records.len() - 1
    }

    /// A dictionary resource: parent link, declared hashes, opaque body.
    pub(crate) fn dictionary(
        &mut self,
        name: &str,
        parent: Option<ContentHash>,
        declared: &[ContentHash],
        body: &[u8],
    ) -> usize {
        let payload = dictionary_payload(parent, declared, body);
        self.resource(name, &payload, 0, 0)
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let header = ArchiveHeader {
            entry_count: self.records.len() as u32,
            name_table_len: self.names.len() as u32,
            encryption_tag: self.encryption_tag,
        };
        let mut out = Vec::new();
        out.extend_from_slice(&header.encode());
        for record in &self.records {
            out.extend_from_slice(&record.encode());
        }
        out.extend_from_slice(&self.names);
        let base = PAYLOAD_BASE_SECTOR as usize * SECTOR_SIZE as usize;
        assert!(
            out.len() <= base,
            "test archive metadata overflowed the payload base"
        );
        out.resize(base, 0);
        out.extend_from_slice(&self.payload);
        out
    }
}
