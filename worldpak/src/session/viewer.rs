//! One viewer session: overlays, resolver and caches wired together.
//!
//! The render loop calls [`ViewerSession::fetch`] for every content hash
//! a selected leaf needs. The session resolves the hash, streams the
//! payload through the matching cache, and pins it until the caller
//! releases. Misses and failures degrade to outcomes the caller can
//! replace with placeholders; only a parent-chain cycle or a load
//! failure surfaces as an error.

use std::sync::Arc;

use bytes::Bytes;

use crate::cache::{CacheKind, CacheSet, LoadFailure};
use crate::hash::ContentHash;
use crate::overlay::OverlaySet;
use crate::resolver::{ResolveContext, ResolvedSource, ResourceResolver};
use crate::telemetry::DiagnosticsSnapshot;

use super::config::SessionConfig;
use super::error::SessionError;

/// What a fetch produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Bytes are resident and pinned for this caller; pair with
    /// [`ViewerSession::release`].
    Loaded(Bytes),
    /// Satisfied by the object's embedded dictionary; nothing to stream.
    Embedded,
    /// Resolution miss; render a placeholder.
    Miss,
}

pub struct ViewerSession {
    overlays: Arc<OverlaySet>,
    resolver: ResourceResolver,
    caches: CacheSet,
}

impl ViewerSession {
    pub fn new(overlays: Arc<OverlaySet>) -> Self {
        Self::with_config(overlays, SessionConfig::default())
    }

    pub fn with_config(overlays: Arc<OverlaySet>, config: SessionConfig) -> Self {
        let resolver = ResourceResolver::with_options(Arc::clone(&overlays), config.resolver);
        let caches = CacheSet::new(config.mesh_cache, config.texture_cache);
        Self {
            overlays,
            resolver,
            caches,
        }
    }

    pub fn overlays(&self) -> &Arc<OverlaySet> {
        &self.overlays
    }

    pub fn resolver(&self) -> &ResourceResolver {
        &self.resolver
    }

    pub fn caches(&self) -> &CacheSet {
        &self.caches
    }

    /// Resolve one content hash and stream its payload.
    ///
    /// Extraction runs on the blocking pool; concurrent fetches of the
    /// same hash coalesce onto one extraction.
    ///
    /// # Errors
    ///
    /// `Resolve` for a parent-chain cycle, `Cache` when the load fails
    /// or times out.
    pub async fn fetch(
        &self,
        kind: CacheKind,
        hash: ContentHash,
        ctx: &ResolveContext,
    ) -> Result<FetchOutcome, SessionError> {
        let source = match self.resolver.resolve(hash, ctx)? {
            Some(source) => source,
            None => return Ok(FetchOutcome::Miss),
        };
        let location = match source {
            ResolvedSource::Embedded => return Ok(FetchOutcome::Embedded),
            ResolvedSource::Pack(location) => location,
        };

        let overlays = Arc::clone(&self.overlays);
        let bytes = self
            .caches
            .cache(kind)
            .get_or_load(hash, || async move {
                let handle = tokio::task::spawn_blocking(move || overlays.extract(location));
                match handle.await {
                    Ok(Ok(payload)) => Ok(Bytes::from(payload)),
                    Ok(Err(error)) => Err(LoadFailure::failed(error.to_string())),
                    Err(join_error) => Err(LoadFailure::failed(join_error.to_string())),
                }
            })
            .await?;
        Ok(FetchOutcome::Loaded(bytes))
    }

    /// Drop one pin taken by a successful fetch.
    pub fn release(&self, kind: CacheKind, hash: ContentHash) {
        self.caches.cache(kind).release(hash);
    }

    /// Change one cache budget; applies on that cache's next access.
    pub fn set_budget(&self, kind: CacheKind, budget_bytes: u64) {
        self.caches.cache(kind).set_budget(budget_bytes);
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            mesh: self.caches.mesh().stats(),
            texture: self.caches.texture().stats(),
            resolver: self.resolver.metrics().snapshot(),
        }
    }
}
