//! Content hashing for archive entries and resolution keys.
//!
//! Every asset is addressed by a 32-bit hash of its logical name. The hash is
//! Jenkins one-at-a-time over the ASCII-lowercased bytes, so `Props\Rock01.wdr`
//! and `props/ROCK01.WDR` address the same content. Hashing the empty string
//! yields 0, which dictionary payloads reserve to mean "no parent".

use std::fmt;

use serde::{Deserialize, Serialize};

/// 32-bit content hash of a logical resource name.
///
/// This is the key type used by overlay indices, the resolver, and the
/// streaming caches. Hashes are computed from the name *stem* (no extension),
/// so a mesh and the texture dictionary that shares its stem hash differently
/// only through [`NameHash`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub u32);

impl ContentHash {
    /// Hash a logical name (case-insensitive).
    pub fn of(name: &str) -> Self {
        Self(jenkins_oat(name))
    }

    /// The raw 32-bit value.
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl From<u32> for ContentHash {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// 64-bit entry identity built from two 32-bit words.
///
/// The low word hashes the name stem and is the [`ContentHash`] resolution
/// key; the high word hashes the full name including extension, so entries
/// sharing a stem (`rock.wdr`, `rock.wtd`) remain distinct identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NameHash {
    stem: ContentHash,
    full: u32,
}

impl NameHash {
    /// Compute the identity of an entry name.
    pub fn of(name: &str) -> Self {
        let stem = match name.rsplit_once('.') {
            Some((stem, _ext)) => stem,
            None => name,
        };
        Self {
            stem: ContentHash::of(stem),
            full: jenkins_oat(name),
        }
    }

    /// The stem word, used as the resolution key.
    pub fn stem(self) -> ContentHash {
        self.stem
    }

    /// The combined 64-bit identity.
    pub fn as_u64(self) -> u64 {
        (u64::from(self.full) << 32) | u64::from(self.stem.0)
    }
}

impl fmt::Display for NameHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.as_u64())
    }
}

fn jenkins_oat(name: &str) -> u32 {
    let mut h: u32 = 0;
    for byte in name.bytes() {
        h = h.wrapping_add(u32::from(byte.to_ascii_lowercase()));
        h = h.wrapping_add(h << 10);
        h ^= h >> 6;
    }
    h = h.wrapping_add(h << 3);
    h ^= h >> 11;
    h.wrapping_add(h << 15)
}
