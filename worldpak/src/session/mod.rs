//! Viewer session facade.
//!
//! Wires an [`OverlaySet`](crate::overlay::OverlaySet) to a
//! [`ResourceResolver`](crate::resolver::ResourceResolver) and a pair of
//! streaming caches, behind one `fetch`/`release` surface:
//!
//! ```text
//!   fetch(kind, hash, ctx)
//!        |
//!        v
//!   ResourceResolver::resolve ----> Miss / Embedded
//!        |
//!        v  Pack(location)
//!   StreamingCache::get_or_load --> OverlaySet::extract (blocking pool)
//!        |
//!        v
//!   FetchOutcome::Loaded(bytes)    pinned until release()
//! ```

mod config;
mod error;
mod viewer;

pub use config::{SessionConfig, DEFAULT_MESH_BUDGET_BYTES, DEFAULT_TEXTURE_BUDGET_BYTES};
pub use error::SessionError;
pub use viewer::{FetchOutcome, ViewerSession};
