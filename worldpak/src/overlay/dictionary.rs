//! Dictionary payload parsing.
//!
//! A dictionary is a resource entry whose decoded payload starts with a
//! small directory: a magic word, an optional parent link, and the list of
//! content hashes the dictionary declares it can satisfy. Everything after
//! the hash list is renderer data and stays opaque here.
//!
//! ```text
//! u32  magic            "WDIC"
//! u32  parent stem hash 0 when the dictionary has no parent
//! u32  declared count
//! u32  declared hash    repeated `count` times
//! ...  opaque body
//! ```

use bytes::Buf;
use thiserror::Error;

use crate::hash::ContentHash;

pub const DICTIONARY_MAGIC: u32 = u32::from_le_bytes(*b"WDIC");

/// Fixed prefix before the declared-hash list.
pub const DICTIONARY_HEADER_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum DictionaryError {
    #[error("dictionary payload too short: {len} bytes")]
    TooShort { len: usize },

    #[error("bad dictionary magic {found:#010x}")]
    BadMagic { found: u32 },

    #[error("dictionary declares {declared} hashes but payload holds {available}")]
    TruncatedHashList { declared: u32, available: usize },
}

/// Parsed dictionary metadata: parent link and declared content hashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryTable {
    parent: Option<ContentHash>,
    declared: Vec<ContentHash>,
}

impl DictionaryTable {
    /// Parse the decoded payload of a dictionary entry.
    ///
    /// # Errors
    ///
    /// `TooShort` when the fixed prefix is missing, `BadMagic` when the
    /// payload is not a dictionary, `TruncatedHashList` when the declared
    /// count exceeds the remaining payload.
    pub fn parse(payload: &[u8]) -> Result<Self, DictionaryError> {
        if payload.len() < DICTIONARY_HEADER_LEN {
            return Err(DictionaryError::TooShort { len: payload.len() });
        }
        let mut buf = payload;
        let magic = buf.get_u32_le();
        if magic != DICTIONARY_MAGIC {
            return Err(DictionaryError::BadMagic { found: magic });
        }
        let parent_raw = buf.get_u32_le();
        let count = buf.get_u32_le();
        let available = buf.remaining() / 4;
        if count as usize > available {
            return Err(DictionaryError::TruncatedHashList {
                declared: count,
                available,
            });
        }
        let mut declared = Vec::with_capacity(count as usize);
        for _ in 0..count {
            declared.push(ContentHash::from(buf.get_u32_le()));
        }
        let parent = (parent_raw != 0).then_some(ContentHash::from(parent_raw));
        Ok(Self { parent, declared })
    }

    /// Stem hash of the parent dictionary, if any.
    pub fn parent(&self) -> Option<ContentHash> {
        self.parent
    }

    /// Content hashes this dictionary declares.
    pub fn declared(&self) -> &[ContentHash] {
        &self.declared
    }

    pub fn declares(&self, hash: ContentHash) -> bool {
        self.declared.contains(&hash)
    }
}
