//! Budgeted streaming cache with request coalescing.
//!
//! One cache instance holds decoded payloads keyed by content hash. The
//! contract, in order of importance:
//!
//! * exactly one loader invocation per concurrent burst of requests for
//!   the same key; later callers attach to the in-flight load,
//! * payloads handed out are pinned until released and never evicted,
//! * resident bytes stay under the budget via LRU eviction of unpinned
//!   entries; pinned entries make over-budget a transient condition,
//! * failed loads are remembered for a bounded time before retrying.
//!
//! The cache-wide lock guards only slot bookkeeping. Loads run unlocked;
//! waiters park on a per-key broadcast channel created while the slot is
//! `Loading`. A leader that disappears without completing (cancelled,
//! panicked) drops the channel sender, which wakes every waiter to retry
//! the slot from scratch.

use std::collections::HashMap;
use std::future::Future;
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::hash::ContentHash;

use super::stats::CacheStats;
use super::CacheKind;

pub const DEFAULT_BUDGET_BYTES: u64 = 256 * 1024 * 1024;
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_FAILURE_TTL: Duration = Duration::from_secs(5);

/// Streaming cache tuning.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Resident payload budget in bytes.
    pub budget_bytes: u64,
    /// Hard deadline for one loader invocation.
    pub load_timeout: Duration,
    /// How long a failed load is remembered before it becomes retryable.
    pub failure_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            budget_bytes: DEFAULT_BUDGET_BYTES,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            failure_ttl: DEFAULT_FAILURE_TTL,
        }
    }
}

impl CacheConfig {
    pub fn with_budget_bytes(mut self, budget_bytes: u64) -> Self {
        self.budget_bytes = budget_bytes;
        self
    }

    pub fn with_load_timeout(mut self, load_timeout: Duration) -> Self {
        self.load_timeout = load_timeout;
        self
    }

    pub fn with_failure_ttl(mut self, failure_ttl: Duration) -> Self {
        self.failure_ttl = failure_ttl;
        self
    }
}

/// Why a load failed. Cloneable so one failure can be fanned out to every
/// coalesced waiter and remembered in the slot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadFailure {
    #[error("load timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("{reason}")]
    Failed { reason: Arc<str> },
}

impl LoadFailure {
    pub fn failed(reason: impl AsRef<str>) -> Self {
        Self::Failed {
            reason: Arc::from(reason.as_ref()),
        }
    }
}

#[derive(Debug, Error)]
#[error("load of {hash} failed: {failure}")]
pub struct CacheError {
    pub hash: ContentHash,
    #[source]
    pub failure: LoadFailure,
}

enum SlotState {
    /// A leader is running the loader; waiters subscribe to the channel.
    Loading(broadcast::Sender<Result<Bytes, LoadFailure>>),
    Ready(Bytes),
    Failed { failure: LoadFailure, at: Instant },
}

struct Slot {
    state: SlotState,
    /// Callers currently holding the payload. Only unreferenced Ready
    /// slots are eviction candidates.
    ref_count: u32,
    /// Logical tick of the last touch, for LRU ordering.
    last_touched: u64,
}

struct CacheInner {
    entries: HashMap<ContentHash, Slot>,
    resident_bytes: u64,
    budget_bytes: u64,
    clock: u64,
    /// Earliest instant at which any Failed slot becomes sweepable, so
    /// access paths can skip the sweep with a single compare.
    next_failure_expiry: Option<Instant>,
    hits: u64,
    misses: u64,
    loads_completed: u64,
    load_failures: u64,
    evictions: u64,
}

enum Lookup {
    Hit(Bytes),
    Wait(broadcast::Receiver<Result<Bytes, LoadFailure>>),
    Lead,
    Fail(LoadFailure),
}

/// Removes the Loading slot if the leader vanishes before completing.
/// Dropping the slot drops the broadcast sender, waking all waiters.
struct AbandonGuard<'a> {
    cache: &'a StreamingCache,
    hash: ContentHash,
    armed: bool,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut guard = self.cache.inner.lock();
        if let Some(slot) = guard.entries.get(&self.hash) {
            if matches!(slot.state, SlotState::Loading(_)) {
                guard.entries.remove(&self.hash);
                debug!(
                    cache = self.cache.kind.as_str(),
                    hash = %self.hash,
                    "load abandoned before completion"
                );
            }
        }
    }
}

/// One bounded payload cache. Shared by reference; all methods take `&self`.
pub struct StreamingCache {
    kind: CacheKind,
    load_timeout: Duration,
    failure_ttl: Duration,
    inner: Mutex<CacheInner>,
}

impl StreamingCache {
    pub fn new(kind: CacheKind, config: CacheConfig) -> Self {
        Self {
            kind,
            load_timeout: config.load_timeout,
            failure_ttl: config.failure_ttl,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                resident_bytes: 0,
                budget_bytes: config.budget_bytes,
                clock: 0,
                next_failure_expiry: None,
                hits: 0,
                misses: 0,
                loads_completed: 0,
                load_failures: 0,
                evictions: 0,
            }),
        }
    }

    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    /// Fetch a payload, loading it at most once per concurrent burst.
    ///
    /// On success the entry is pinned for this caller; pair every `Ok`
    /// with a later [`release`](Self::release). Remembered failures
    /// within their time-to-live are returned without invoking `load`.
    pub async fn get_or_load<F, Fut>(&self, hash: ContentHash, load: F) -> Result<Bytes, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, LoadFailure>>,
    {
        loop {
            let lookup = {
                let mut guard = self.inner.lock();
                let inner = &mut *guard;
                inner.clock += 1;
                let tick = inner.clock;
                let lookup = match inner.entries.get_mut(&hash) {
                    Some(slot) => match &slot.state {
                        SlotState::Ready(bytes) => {
                            slot.ref_count += 1;
                            slot.last_touched = tick;
                            inner.hits += 1;
                            Lookup::Hit(bytes.clone())
                        }
                        SlotState::Loading(tx) => Lookup::Wait(tx.subscribe()),
                        SlotState::Failed { failure, at } => {
                            if at.elapsed() < self.failure_ttl {
                                Lookup::Fail(failure.clone())
                            } else {
                                let (tx, _rx) = broadcast::channel(1);
                                slot.state = SlotState::Loading(tx);
                                slot.ref_count = 0;
                                slot.last_touched = tick;
                                inner.misses += 1;
                                Lookup::Lead
                            }
                        }
                    },
                    None => {
                        let (tx, _rx) = broadcast::channel(1);
                        inner.entries.insert(
                            hash,
                            Slot {
                                state: SlotState::Loading(tx),
                                ref_count: 0,
                                last_touched: tick,
                            },
                        );
                        inner.misses += 1;
                        Lookup::Lead
                    }
                };
                if matches!(lookup, Lookup::Hit(_)) {
                    self.evict_locked(inner);
                }
                lookup
            };

            match lookup {
                Lookup::Hit(bytes) => return Ok(bytes),
                Lookup::Fail(failure) => return Err(CacheError { hash, failure }),
                Lookup::Lead => return self.lead_load(hash, load).await,
                Lookup::Wait(mut rx) => match rx.recv().await {
                    Ok(Ok(bytes)) => {
                        if self.pin_after_wait(hash, &bytes) {
                            return Ok(bytes);
                        }
                        continue;
                    }
                    Ok(Err(failure)) => return Err(CacheError { hash, failure }),
                    Err(_closed) => {
                        debug!(
                            cache = self.kind.as_str(),
                            %hash,
                            "in-flight load vanished, retrying"
                        );
                        continue;
                    }
                },
            }
        }
    }

    /// Run the loader as the single leader for this key.
    async fn lead_load<F, Fut>(&self, hash: ContentHash, load: F) -> Result<Bytes, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, LoadFailure>>,
    {
        let mut guard = AbandonGuard {
            cache: self,
            hash,
            armed: true,
        };
        let outcome = match tokio::time::timeout(self.load_timeout, load()).await {
            Ok(result) => result,
            Err(_elapsed) => Err(LoadFailure::Timeout {
                after: self.load_timeout,
            }),
        };
        guard.armed = false;
        self.complete(hash, outcome)
    }

    /// Swap the Loading slot to Ready/Failed and notify waiters.
    ///
    /// The broadcast send happens after the state swap so a caller that
    /// missed the channel observes the new slot state instead.
    fn complete(
        &self,
        hash: ContentHash,
        outcome: Result<Bytes, LoadFailure>,
    ) -> Result<Bytes, CacheError> {
        let sender;
        {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            inner.clock += 1;
            let tick = inner.clock;

            let (new_state, ref_count, added) = match &outcome {
                Ok(bytes) => (SlotState::Ready(bytes.clone()), 1, bytes.len() as u64),
                Err(failure) => {
                    let at = Instant::now();
                    if let Some(expiry) = at.checked_add(self.failure_ttl) {
                        inner.next_failure_expiry = Some(match inner.next_failure_expiry {
                            Some(existing) => existing.min(expiry),
                            None => expiry,
                        });
                    }
                    (
                        SlotState::Failed {
                            failure: failure.clone(),
                            at,
                        },
                        0,
                        0,
                    )
                }
            };

            sender = match inner.entries.get_mut(&hash) {
                Some(slot) => {
                    let previous = mem::replace(&mut slot.state, new_state);
                    slot.ref_count = ref_count;
                    slot.last_touched = tick;
                    match previous {
                        SlotState::Loading(tx) => Some(tx),
                        _ => None,
                    }
                }
                None => {
                    inner.entries.insert(
                        hash,
                        Slot {
                            state: new_state,
                            ref_count,
                            last_touched: tick,
                        },
                    );
                    None
                }
            };

            inner.resident_bytes += added;
            match &outcome {
                Ok(_) => inner.loads_completed += 1,
                Err(_) => inner.load_failures += 1,
            }
            self.evict_locked(inner);
        }

        if let Some(tx) = sender {
            let _ = tx.send(outcome.clone());
        }

        match outcome {
            Ok(bytes) => Ok(bytes),
            Err(failure) => {
                warn!(cache = self.kind.as_str(), %hash, %failure, "load failed");
                Err(CacheError { hash, failure })
            }
        }
    }

    /// Pin the slot for a waiter that received bytes over the channel,
    /// returning whether a pin was taken.
    ///
    /// The slot can be gone already if the leader released its pin and the
    /// entry was evicted before this waiter woke; restore it so the pin
    /// has something to hold. If the entry was evicted and a newer load
    /// already occupies the slot, no pin is taken: the caller must retry
    /// the lookup rather than hand out bytes it holds no pin on.
    fn pin_after_wait(&self, hash: ContentHash, bytes: &Bytes) -> bool {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.clock += 1;
        let tick = inner.clock;
        match inner.entries.get_mut(&hash) {
            Some(slot) => {
                if matches!(slot.state, SlotState::Ready(_)) {
                    slot.ref_count += 1;
                    slot.last_touched = tick;
                    inner.hits += 1;
                    true
                } else {
                    false
                }
            }
            None => {
                inner.entries.insert(
                    hash,
                    Slot {
                        state: SlotState::Ready(bytes.clone()),
                        ref_count: 1,
                        last_touched: tick,
                    },
                );
                inner.resident_bytes += bytes.len() as u64;
                inner.hits += 1;
                self.evict_locked(inner);
                true
            }
        }
    }

    /// Non-blocking lookup. Refreshes recency but takes no pin.
    pub fn probe(&self, hash: ContentHash) -> Option<Bytes> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.clock += 1;
        let tick = inner.clock;
        match inner.entries.get_mut(&hash) {
            Some(slot) => match &slot.state {
                SlotState::Ready(bytes) => {
                    slot.last_touched = tick;
                    Some(bytes.clone())
                }
                _ => None,
            },
            None => None,
        }
    }

    /// Drop one pin. Entries at zero pins become eviction-eligible but
    /// stay resident until an access path next runs eviction.
    pub fn release(&self, hash: ContentHash) {
        let mut guard = self.inner.lock();
        match guard.entries.get_mut(&hash) {
            Some(slot) if matches!(slot.state, SlotState::Ready(_)) && slot.ref_count > 0 => {
                slot.ref_count -= 1;
            }
            _ => {
                warn!(cache = self.kind.as_str(), %hash, "release without matching pin");
            }
        }
    }

    /// Change the budget. Takes effect on the next access path; an
    /// over-budget cache is not trimmed synchronously here.
    pub fn set_budget(&self, budget_bytes: u64) {
        let mut guard = self.inner.lock();
        guard.budget_bytes = budget_bytes;
        debug!(
            cache = self.kind.as_str(),
            budget_bytes,
            resident = guard.resident_bytes,
            "budget changed"
        );
    }

    pub fn stats(&self) -> CacheStats {
        let guard = self.inner.lock();
        let mut resident_entries = 0;
        let mut pinned_entries = 0;
        let mut loading_entries = 0;
        let mut failed_entries = 0;
        for slot in guard.entries.values() {
            match slot.state {
                SlotState::Ready(_) => {
                    resident_entries += 1;
                    if slot.ref_count > 0 {
                        pinned_entries += 1;
                    }
                }
                SlotState::Loading(_) => loading_entries += 1,
                SlotState::Failed { .. } => failed_entries += 1,
            }
        }
        CacheStats {
            resident_bytes: guard.resident_bytes,
            budget_bytes: guard.budget_bytes,
            resident_entries,
            pinned_entries,
            loading_entries,
            failed_entries,
            hits: guard.hits,
            misses: guard.misses,
            loads_completed: guard.loads_completed,
            load_failures: guard.load_failures,
            evictions: guard.evictions,
        }
    }

    /// Evict unpinned Ready entries, least recently touched first, until
    /// resident bytes fit the budget or nothing evictable remains. Also
    /// sweeps expired failure records so slots for hashes that are never
    /// asked for again do not pile up.
    fn evict_locked(&self, inner: &mut CacheInner) {
        if inner
            .next_failure_expiry
            .is_some_and(|expiry| Instant::now() >= expiry)
        {
            self.sweep_expired_failures(inner);
        }
        while inner.resident_bytes > inner.budget_bytes {
            let victim = inner
                .entries
                .iter()
                .filter_map(|(hash, slot)| match &slot.state {
                    SlotState::Ready(bytes) if slot.ref_count == 0 => {
                        Some((*hash, slot.last_touched, bytes.len() as u64))
                    }
                    _ => None,
                })
                .min_by_key(|&(_, touched, _)| touched);

            let (hash, _, len) = match victim {
                Some(victim) => victim,
                None => {
                    let blocked = inner.entries.values().any(|slot| {
                        matches!(slot.state, SlotState::Loading(_))
                            || (matches!(slot.state, SlotState::Ready(_)) && slot.ref_count > 0)
                    });
                    if blocked {
                        debug!(
                            cache = self.kind.as_str(),
                            resident = inner.resident_bytes,
                            budget = inner.budget_bytes,
                            "over budget with everything pinned or loading"
                        );
                    } else {
                        error!(
                            cache = self.kind.as_str(),
                            resident = inner.resident_bytes,
                            budget = inner.budget_bytes,
                            "resident byte accounting drifted"
                        );
                        debug_assert!(false, "resident bytes with no resident entries");
                    }
                    return;
                }
            };

            inner.entries.remove(&hash);
            inner.resident_bytes = inner.resident_bytes.saturating_sub(len);
            inner.evictions += 1;
            debug!(cache = self.kind.as_str(), %hash, len, "evicted");
        }
    }

    /// Drop every failure record whose time-to-live has lapsed and record
    /// the earliest expiry among the survivors.
    fn sweep_expired_failures(&self, inner: &mut CacheInner) {
        let mut next: Option<Instant> = None;
        inner.entries.retain(|hash, slot| match slot.state {
            SlotState::Failed { at, .. } => {
                if at.elapsed() >= self.failure_ttl {
                    debug!(cache = self.kind.as_str(), %hash, "expired failure dropped");
                    false
                } else {
                    if let Some(expiry) = at.checked_add(self.failure_ttl) {
                        next = Some(match next {
                            Some(existing) => existing.min(expiry),
                            None => expiry,
                        });
                    }
                    true
                }
            }
            _ => true,
        });
        inner.next_failure_expiry = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll, Waker};
    use tokio::sync::{oneshot, Notify};

    fn cache_with(config: CacheConfig) -> StreamingCache {
        StreamingCache::new(CacheKind::Mesh, config)
    }

    fn payload(len: usize, fill: u8) -> Bytes {
        Bytes::from(vec![fill; len])
    }

    #[tokio::test]
    async fn test_load_once_then_hit() {
        let cache = cache_with(CacheConfig::default());
        let hash = ContentHash::of("rock01");
        let runs = AtomicUsize::new(0);

        let first = cache
            .get_or_load(hash, || async {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(payload(8, 1))
            })
            .await
            .unwrap();
        let second = cache
            .get_or_load(hash, || async {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(payload(8, 2))
            })
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.loads_completed, 1);
        assert_eq!(stats.resident_entries, 1);
        assert_eq!(stats.pinned_entries, 1);
        assert!(cache.probe(hash).is_some());

        cache.release(hash);
        cache.release(hash);
        assert_eq!(cache.stats().pinned_entries, 0);
    }

    #[tokio::test]
    async fn test_concurrent_requests_coalesce() {
        let cache = Arc::new(cache_with(CacheConfig::default()));
        let runs = Arc::new(AtomicUsize::new(0));
        let hash = ContentHash::of("shared");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let runs = Arc::clone(&runs);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_load(hash, || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(Bytes::from_static(b"R"))
                    })
                    .await
            }));
        }
        for handle in handles {
            let bytes = handle.await.unwrap().unwrap();
            assert_eq!(&bytes[..], b"R");
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.loads_completed, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 7);
    }

    #[tokio::test]
    async fn test_sequential_loads_evict_least_recent() {
        let cache = cache_with(CacheConfig::default().with_budget_bytes(100));
        let (k1, k2, k3) = (
            ContentHash::of("k1"),
            ContentHash::of("k2"),
            ContentHash::of("k3"),
        );

        for (key, fill) in [(k1, 1u8), (k2, 2), (k3, 3)] {
            cache
                .get_or_load(key, || async move { Ok(payload(40, fill)) })
                .await
                .unwrap();
            cache.release(key);
        }

        assert!(cache.probe(k1).is_none());
        assert!(cache.probe(k2).is_some());
        assert!(cache.probe(k3).is_some());
        let stats = cache.stats();
        assert_eq!(stats.resident_bytes, 80);
        assert_eq!(stats.evictions, 1);
    }

    #[tokio::test]
    async fn test_hit_refreshes_recency() {
        let cache = cache_with(CacheConfig::default().with_budget_bytes(100));
        let (k1, k2, k3) = (
            ContentHash::of("k1"),
            ContentHash::of("k2"),
            ContentHash::of("k3"),
        );

        for (key, fill) in [(k1, 1u8), (k2, 2)] {
            cache
                .get_or_load(key, || async move { Ok(payload(40, fill)) })
                .await
                .unwrap();
            cache.release(key);
        }
        // Touch k1 so k2 becomes the oldest.
        cache
            .get_or_load(k1, || async { Ok(payload(40, 9)) })
            .await
            .unwrap();
        cache.release(k1);
        cache
            .get_or_load(k3, || async { Ok(payload(40, 3)) })
            .await
            .unwrap();
        cache.release(k3);

        assert!(cache.probe(k1).is_some());
        assert!(cache.probe(k2).is_none());
        assert!(cache.probe(k3).is_some());
    }

    #[tokio::test]
    async fn test_pinned_entries_survive_eviction() {
        let cache = cache_with(CacheConfig::default().with_budget_bytes(50));
        let (k1, k2, k3) = (
            ContentHash::of("k1"),
            ContentHash::of("k2"),
            ContentHash::of("k3"),
        );

        cache
            .get_or_load(k1, || async { Ok(payload(40, 1)) })
            .await
            .unwrap();
        cache
            .get_or_load(k2, || async { Ok(payload(40, 2)) })
            .await
            .unwrap();

        // Both pinned: over budget is transient, nothing is evicted.
        let stats = cache.stats();
        assert_eq!(stats.resident_bytes, 80);
        assert_eq!(stats.evictions, 0);
        assert!(cache.probe(k1).is_some());
        assert!(cache.probe(k2).is_some());

        // Release alone does not evict.
        cache.release(k1);
        assert!(cache.probe(k1).is_some());

        // The next load runs eviction and claims k1's bytes.
        cache
            .get_or_load(k3, || async { Ok(payload(10, 3)) })
            .await
            .unwrap();
        assert!(cache.probe(k1).is_none());
        assert!(cache.probe(k2).is_some());
        assert_eq!(cache.stats().resident_bytes, 50);
    }

    #[tokio::test]
    async fn test_set_budget_applies_on_next_access() {
        let cache = cache_with(CacheConfig::default().with_budget_bytes(100));
        let k1 = ContentHash::of("k1");
        cache
            .get_or_load(k1, || async { Ok(payload(40, 1)) })
            .await
            .unwrap();
        cache.release(k1);

        cache.set_budget(10);
        // Not trimmed yet.
        assert_eq!(cache.stats().resident_bytes, 40);
        assert!(cache.probe(k1).is_some());

        let k2 = ContentHash::of("k2");
        cache
            .get_or_load(k2, || async { Ok(payload(5, 2)) })
            .await
            .unwrap();
        assert!(cache.probe(k1).is_none());
        assert_eq!(cache.stats().resident_bytes, 5);
    }

    #[tokio::test]
    async fn test_failed_load_remembered_within_ttl() {
        let cache =
            cache_with(CacheConfig::default().with_failure_ttl(Duration::from_secs(60)));
        let hash = ContentHash::of("missing");
        let runs = AtomicUsize::new(0);

        let first = cache
            .get_or_load(hash, || async {
                runs.fetch_add(1, Ordering::SeqCst);
                Err(LoadFailure::failed("no such asset"))
            })
            .await
            .unwrap_err();
        let second = cache
            .get_or_load(hash, || async {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(payload(4, 0))
            })
            .await
            .unwrap_err();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(first.failure, second.failure);
        assert_eq!(cache.stats().load_failures, 1);
    }

    #[tokio::test]
    async fn test_failed_load_retries_after_ttl() {
        let cache = cache_with(CacheConfig::default().with_failure_ttl(Duration::ZERO));
        let hash = ContentHash::of("flaky");
        let runs = AtomicUsize::new(0);

        cache
            .get_or_load(hash, || async {
                runs.fetch_add(1, Ordering::SeqCst);
                Err(LoadFailure::failed("transient"))
            })
            .await
            .unwrap_err();
        let bytes = cache
            .get_or_load(hash, || async {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(Bytes::from_static(b"recovered"))
            })
            .await
            .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(&bytes[..], b"recovered");
    }

    #[tokio::test]
    async fn test_expired_failures_swept_without_rerequest() {
        let cache =
            cache_with(CacheConfig::default().with_failure_ttl(Duration::from_millis(10)));

        for name in ["gone_a", "gone_b", "gone_c"] {
            cache
                .get_or_load(ContentHash::of(name), || async {
                    Err(LoadFailure::failed("no such asset"))
                })
                .await
                .unwrap_err();
        }
        assert_eq!(cache.stats().failed_entries, 3);

        tokio::time::sleep(Duration::from_millis(30)).await;

        // A load of an unrelated hash reclaims every expired record, even
        // though the failing hashes themselves are never asked for again.
        let alive = ContentHash::of("alive");
        cache
            .get_or_load(alive, || async { Ok(payload(8, 1)) })
            .await
            .unwrap();
        cache.release(alive);

        let stats = cache.stats();
        assert_eq!(stats.failed_entries, 0);
        assert_eq!(stats.resident_entries, 1);
        assert_eq!(stats.load_failures, 3);
    }

    #[tokio::test]
    async fn test_slow_load_times_out_and_is_remembered() {
        let cache = cache_with(
            CacheConfig::default()
                .with_load_timeout(Duration::from_millis(25))
                .with_failure_ttl(Duration::from_secs(60)),
        );
        let hash = ContentHash::of("glacial");
        let runs = AtomicUsize::new(0);

        let err = cache
            .get_or_load(hash, || async {
                runs.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(payload(4, 0))
            })
            .await
            .unwrap_err();
        assert!(matches!(err.failure, LoadFailure::Timeout { .. }));

        // Within the failure window the loader is not retried.
        let err = cache
            .get_or_load(hash, || async {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(payload(4, 0))
            })
            .await
            .unwrap_err();
        assert!(matches!(err.failure, LoadFailure::Timeout { .. }));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abandoned_load_recovers() {
        let cache = Arc::new(cache_with(CacheConfig::default()));
        let hash = ContentHash::of("slow");
        let started = Arc::new(Notify::new());

        let leader = {
            let cache = Arc::clone(&cache);
            let started = Arc::clone(&started);
            tokio::spawn(async move {
                cache
                    .get_or_load(hash, || async move {
                        started.notify_one();
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Ok(Bytes::from_static(b"never"))
                    })
                    .await
            })
        };
        started.notified().await;
        leader.abort();
        let _ = leader.await;

        let bytes = cache
            .get_or_load(hash, || async { Ok(Bytes::from_static(b"recovered")) })
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"recovered");
    }

    #[tokio::test]
    async fn test_waiter_takes_over_after_leader_abort() {
        let cache = Arc::new(cache_with(CacheConfig::default()));
        let hash = ContentHash::of("slow");
        let started = Arc::new(Notify::new());

        let leader = {
            let cache = Arc::clone(&cache);
            let started = Arc::clone(&started);
            tokio::spawn(async move {
                cache
                    .get_or_load(hash, || async move {
                        started.notify_one();
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Ok(Bytes::from_static(b"never"))
                    })
                    .await
            })
        };
        started.notified().await;

        let waiter = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_load(hash, || async { Ok(Bytes::from_static(b"from waiter")) })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        leader.abort();
        let _ = leader.await;

        let bytes = waiter.await.unwrap().unwrap();
        assert_eq!(&bytes[..], b"from waiter");
    }

    #[tokio::test]
    async fn test_waiter_woken_after_eviction_rejoins_inflight_reload() {
        let cache = cache_with(CacheConfig::default().with_budget_bytes(40));
        let (k1, k2, k3) = (
            ContentHash::of("k1"),
            ContentHash::of("k2"),
            ContentHash::of("k3"),
        );
        let waiter_runs = AtomicUsize::new(0);
        let mut cx = Context::from_waker(Waker::noop());

        // First leader for k1, gated so it completes only when told to.
        let (gate1, gate1_rx) = oneshot::channel();
        let mut leader1 = pin!(cache.get_or_load(k1, move || async move {
            let _ = gate1_rx.await;
            Ok(payload(40, 1))
        }));
        assert!(leader1.as_mut().poll(&mut cx).is_pending());

        // The waiter attaches to the in-flight load and parks.
        let mut waiter = pin!(cache.get_or_load(k1, || async {
            waiter_runs.fetch_add(1, Ordering::SeqCst);
            Ok(payload(40, 9))
        }));
        assert!(waiter.as_mut().poll(&mut cx).is_pending());

        // Leader completes and releases; k2 then claims the whole budget,
        // evicting k1 before the waiter has woken.
        gate1.send(()).unwrap();
        match leader1.as_mut().poll(&mut cx) {
            Poll::Ready(Ok(bytes)) => assert_eq!(bytes, payload(40, 1)),
            other => panic!("leader should complete once gated: {other:?}"),
        }
        cache.release(k1);
        cache
            .get_or_load(k2, || async { Ok(payload(40, 2)) })
            .await
            .unwrap();
        cache.release(k2);
        assert!(cache.probe(k1).is_none());

        // A second leader starts reloading k1 before the waiter wakes.
        let (gate2, gate2_rx) = oneshot::channel();
        let mut leader2 = pin!(cache.get_or_load(k1, move || async move {
            let _ = gate2_rx.await;
            Ok(payload(40, 7))
        }));
        assert!(leader2.as_mut().poll(&mut cx).is_pending());

        // The waiter now wakes holding the evicted payload. It must not
        // hand those bytes out unpinned; it reattaches to the reload.
        assert!(waiter.as_mut().poll(&mut cx).is_pending());

        gate2.send(()).unwrap();
        match leader2.as_mut().poll(&mut cx) {
            Poll::Ready(Ok(bytes)) => assert_eq!(bytes, payload(40, 7)),
            other => panic!("reload should complete once gated: {other:?}"),
        }
        match waiter.as_mut().poll(&mut cx) {
            Poll::Ready(Ok(bytes)) => assert_eq!(bytes, payload(40, 7)),
            other => panic!("waiter should adopt the reloaded payload: {other:?}"),
        }
        assert_eq!(waiter_runs.load(Ordering::SeqCst), 0);

        // Dropping the waiter's pin must leave the second leader's pin
        // intact, so the next eviction pass cannot claim k1.
        cache.release(k1);
        cache
            .get_or_load(k3, || async { Ok(payload(40, 3)) })
            .await
            .unwrap();
        assert!(cache.probe(k1).is_some());
        assert_eq!(cache.stats().pinned_entries, 2);

        cache.release(k1);
        cache.release(k3);
    }

    #[tokio::test]
    async fn test_release_without_pin_is_tolerated() {
        let cache = cache_with(CacheConfig::default());
        cache.release(ContentHash::of("never-loaded"));

        let hash = ContentHash::of("once");
        cache
            .get_or_load(hash, || async { Ok(payload(4, 1)) })
            .await
            .unwrap();
        cache.release(hash);
        cache.release(hash);
        assert_eq!(cache.stats().pinned_entries, 0);
        assert!(cache.probe(hash).is_some());
    }

    #[tokio::test]
    async fn test_probe_does_not_pin() {
        let cache = cache_with(CacheConfig::default());
        let hash = ContentHash::of("peek");
        assert!(cache.probe(hash).is_none());

        cache
            .get_or_load(hash, || async { Ok(payload(4, 1)) })
            .await
            .unwrap();
        cache.release(hash);

        assert!(cache.probe(hash).is_some());
        assert_eq!(cache.stats().pinned_entries, 0);
    }
}
