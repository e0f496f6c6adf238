//! A mounted overlay and entry addressing.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::archive::ArchiveReader;

/// Address of one entry within a mounted overlay set: overlay slot in
/// priority order, archive within the overlay, entry within the archive.
///
/// Locations are only meaningful against the `OverlaySet` that produced
/// them; rebuilding the set invalidates old locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackLocation {
    pub overlay: usize,
    pub archive: usize,
    pub entry: usize,
}

impl fmt::Display for PackLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.overlay, self.archive, self.entry)
    }
}

/// One mounted overlay: an ordered list of opened archives plus the
/// declaration it was mounted from. Disabled overlays keep their slot in
/// the stack but hold no archives.
pub struct Overlay {
    id: String,
    root: PathBuf,
    priority: i32,
    enabled: bool,
    archives: Vec<ArchiveReader>,
}

impl Overlay {
    pub(crate) fn new(
        id: String,
        root: PathBuf,
        priority: i32,
        enabled: bool,
        archives: Vec<ArchiveReader>,
    ) -> Self {
        Self {
            id,
            root,
            priority,
            enabled,
            archives,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn archives(&self) -> &[ArchiveReader] {
        &self.archives
    }

    pub fn archive(&self, index: usize) -> Option<&ArchiveReader> {
        self.archives.get(index)
    }
}
