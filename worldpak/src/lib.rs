//! WorldPak - content-addressed archive streaming for a 3D world viewer
//!
//! This library reads WPK7 game archives, layers them into prioritized
//! overlays, resolves 32-bit content hashes to payloads, and streams
//! those payloads through budgeted in-memory caches while the camera
//! moves through the world.
//!
//! The crate is organized bottom-up:
//!
//! | Module        | Responsibility                                        |
//! |---------------|-------------------------------------------------------|
//! | [`hash`]      | Jenkins one-at-a-time content hashing                 |
//! | [`archive`]   | WPK7 container parsing and payload extraction         |
//! | [`overlay`]   | Prioritized overlay mounts and hash indexes           |
//! | [`resolver`]  | Hash-to-source resolution across overlay tiers        |
//! | [`cache`]     | Budgeted, coalescing streaming caches                 |
//! | [`lod`]       | Level-of-detail tree and leaf selection               |
//! | [`session`]   | The viewer-facing fetch/release facade                |
//! | [`telemetry`] | Resolver metrics and diagnostics snapshots            |

pub mod archive;
pub mod cache;
pub mod hash;
pub mod lod;
pub mod overlay;
pub mod resolver;
pub mod session;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testkit;

pub use hash::{ContentHash, NameHash};
pub use session::{FetchOutcome, SessionConfig, SessionError, ViewerSession};
