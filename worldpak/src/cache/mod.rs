//! Streaming payload caches.
//!
//! Meshes and textures stream through two independent caches with the
//! same contract; see [`StreamingCache`] for the coalescing and eviction
//! rules. [`CacheSet`] bundles the pair for the session layer.

use std::fmt;

use serde::Serialize;

pub mod stats;
pub mod streaming;

pub use stats::CacheStats;
pub use streaming::{
    CacheConfig, CacheError, LoadFailure, StreamingCache, DEFAULT_BUDGET_BYTES,
    DEFAULT_FAILURE_TTL, DEFAULT_LOAD_TIMEOUT,
};

/// Which cache a payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    Mesh,
    Texture,
}

impl CacheKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mesh => "mesh",
            Self::Texture => "texture",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The mesh and texture caches a session streams through.
pub struct CacheSet {
    mesh: StreamingCache,
    texture: StreamingCache,
}

impl CacheSet {
    pub fn new(mesh: CacheConfig, texture: CacheConfig) -> Self {
        Self {
            mesh: StreamingCache::new(CacheKind::Mesh, mesh),
            texture: StreamingCache::new(CacheKind::Texture, texture),
        }
    }

    pub fn cache(&self, kind: CacheKind) -> &StreamingCache {
        match kind {
            CacheKind::Mesh => &self.mesh,
            CacheKind::Texture => &self.texture,
        }
    }

    pub fn mesh(&self) -> &StreamingCache {
        &self.mesh
    }

    pub fn texture(&self) -> &StreamingCache {
        &self.texture
    }
}
