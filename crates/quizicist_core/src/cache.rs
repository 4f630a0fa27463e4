//! crates/quizicist_core/src/cache.rs
//!
//! The remote resource cache: one entry per `CacheKey`, shared by every view
//! of that resource.
//!
//! An entry keeps the last server-confirmed value (the base) and the
//! optimistic patches of mutations still in flight. Readers always see the
//! base with the pending patches replayed in issue order. Every event draws a
//! ticket from one monotonic clock; a fetch result is only applied if it was
//! issued after the last change to the base, so a slow response can never
//! overwrite newer state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use crate::mutation::{Mutation, PreparedMutation};
use crate::optimistic::OptimisticPatch;
use crate::ports::{ApiError, ApiResult, RemoteSource};
use crate::resource::{CacheKey, Resource};

type SharedFetch = Shared<BoxFuture<'static, ApiResult<Resource>>>;

/// What a view of one key observes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadState {
    pub value: Option<Resource>,
    /// No value yet and a request is in flight.
    pub is_loading: bool,
    /// A request is in flight, with or without a value.
    pub is_validating: bool,
    /// The last fetch error. Cleared by the next successful fetch.
    pub error: Option<ApiError>,
    pub fetched_at: Option<DateTime<Utc>>,
}

struct PendingWrite {
    seq: u64,
    patch: OptimisticPatch,
}

struct InFlight {
    ticket: u64,
    fetch: SharedFetch,
}

struct Entry {
    base: Option<Resource>,
    base_ticket: u64,
    /// Sequence of the newest mutation whose canonical value became the base.
    canonical_seq: u64,
    pending: Vec<PendingWrite>,
    value: Option<Resource>,
    error: Option<ApiError>,
    fetched_at: Option<DateTime<Utc>>,
    in_flight: Option<InFlight>,
    sender: watch::Sender<ReadState>,
}

impl Entry {
    fn new(created_ticket: u64) -> Self {
        let (sender, _) = watch::channel(ReadState::default());
        Self {
            base: None,
            base_ticket: created_ticket,
            canonical_seq: 0,
            pending: Vec::new(),
            value: None,
            error: None,
            fetched_at: None,
            in_flight: None,
            sender,
        }
    }

    fn set_base(&mut self, base: Option<Resource>, ticket: u64) {
        self.base = base;
        self.base_ticket = ticket;
        self.recompute();
    }

    fn recompute(&mut self) {
        self.value = self
            .pending
            .iter()
            .fold(self.base.clone(), |value, write| value.map(|v| write.patch.apply(v)));
    }

    fn take_pending(&mut self, seq: u64) -> Option<OptimisticPatch> {
        let index = self.pending.iter().position(|w| w.seq == seq)?;
        Some(self.pending.remove(index).patch)
    }

    fn snapshot(&self) -> ReadState {
        ReadState {
            value: self.value.clone(),
            is_loading: self.value.is_none() && self.in_flight.is_some(),
            is_validating: self.in_flight.is_some(),
            error: self.error.clone(),
            fetched_at: self.fetched_at,
        }
    }

    fn publish(&self) {
        self.sender.send_replace(self.snapshot());
    }
}

//=========================================================================================
// The Cache
//=========================================================================================

/// A keyed store of remote resources with request deduplication and
/// optimistic layering. Share it behind an `Arc`; it is never a global.
pub struct ResourceCache {
    source: Arc<dyn RemoteSource>,
    entries: Mutex<HashMap<CacheKey, Entry>>,
    clock: AtomicU64,
}

impl ResourceCache {
    pub fn new(source: Arc<dyn RemoteSource>) -> Self {
        Self {
            source,
            entries: Mutex::new(HashMap::new()),
            clock: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_entry<R>(&self, key: &CacheKey, f: impl FnOnce(&mut Entry) -> R) -> R {
        let mut entries = self.lock();
        let entry = entries
            .entry(*key)
            .or_insert_with(|| Entry::new(self.tick()));
        f(entry)
    }

    fn with_existing<R>(&self, key: &CacheKey, f: impl FnOnce(&mut Entry) -> R) -> Option<R> {
        self.lock().get_mut(key).map(f)
    }

    /// The current (possibly optimistic) value, without touching the network.
    pub fn get(&self, key: &CacheKey) -> Option<Resource> {
        self.lock().get(key).and_then(|entry| entry.value.clone())
    }

    pub fn peek(&self, key: &CacheKey) -> ReadState {
        self.lock()
            .get(key)
            .map(Entry::snapshot)
            .unwrap_or_default()
    }

    /// Watches one key. Every change to the entry is published to all receivers.
    pub fn subscribe(&self, key: &CacheKey) -> watch::Receiver<ReadState> {
        self.with_entry(key, |entry| entry.sender.subscribe())
    }

    /// Returns the cached state, fetching first if nothing is cached yet.
    pub async fn read(&self, key: &CacheKey) -> ReadState {
        if self.get(key).is_none() {
            // A failed fetch is recorded in the returned state.
            let _ = self.fetch(key).await;
        }
        self.peek(key)
    }

    /// Assigns a value directly, bypassing the network. Pending patches stay layered on top.
    pub fn write(&self, key: &CacheKey, value: Resource) {
        let ticket = self.tick();
        self.with_entry(key, |entry| {
            entry.error = None;
            entry.set_base(Some(value), ticket);
            entry.publish();
        });
        debug!(%key, ticket, "cache write");
    }

    /// Refetches from the network, ignoring the cached value.
    ///
    /// On failure the cached value is left untouched and the error is published
    /// to subscribers.
    pub async fn revalidate(&self, key: &CacheKey) -> ApiResult<Resource> {
        self.fetch(key).await
    }

    /// Revalidates only if some value is cached under `key`.
    pub async fn revalidate_if_cached(&self, key: &CacheKey) -> Option<ApiResult<Resource>> {
        if self.get(key).is_none() {
            return None;
        }
        Some(self.fetch(key).await)
    }

    /// Drops the entry. Current subscribers observe an empty state.
    pub fn evict(&self, key: &CacheKey) {
        if let Some(entry) = self.lock().remove(key) {
            entry.sender.send_replace(ReadState::default());
            debug!(%key, "cache entry evicted");
        }
    }

    #[instrument(level = "debug", skip(self), fields(%key))]
    async fn fetch(&self, key: &CacheKey) -> ApiResult<Resource> {
        let (ticket, fetch) = self.with_entry(key, |entry| {
            if let Some(in_flight) = &entry.in_flight {
                // Join only requests issued after the base last changed.
                if in_flight.ticket > entry.base_ticket {
                    return (in_flight.ticket, in_flight.fetch.clone());
                }
            }

            let ticket = self.tick();
            let source = Arc::clone(&self.source);
            let target = *key;
            let fetch = async move { source.fetch(&target).await }.boxed().shared();
            entry.in_flight = Some(InFlight {
                ticket,
                fetch: fetch.clone(),
            });
            entry.publish();
            (ticket, fetch)
        });

        let result = fetch.await.and_then(|resource| {
            if resource.fits(key) {
                Ok(resource)
            } else {
                Err(ApiError::Decode(format!("unexpected resource shape for {}", key)))
            }
        });
        self.settle_fetch(key, ticket, &result);
        result
    }

    fn settle_fetch(&self, key: &CacheKey, ticket: u64, result: &ApiResult<Resource>) {
        self.with_existing(key, |entry| {
            if entry.in_flight.as_ref().map(|f| f.ticket) == Some(ticket) {
                entry.in_flight = None;
            }

            if ticket <= entry.base_ticket {
                debug!(%key, ticket, base_ticket = entry.base_ticket, "discarding stale fetch result");
                entry.publish();
                return;
            }

            match result {
                Ok(resource) => {
                    entry.error = None;
                    entry.fetched_at = Some(Utc::now());
                    entry.set_base(Some(resource.clone()), ticket);
                    debug!(%key, ticket, pending = entry.pending.len(), "fetch applied");
                }
                Err(err) => {
                    warn!(%key, error = %err, "fetch failed; keeping cached value");
                    entry.error = Some(err.clone());
                }
            }
            entry.publish();
        });
    }

    //=====================================================================================
    // Mutation support
    //=====================================================================================

    /// Resolves `mutation` against the current value and, if something is
    /// cached, layers its optimistic patch on top before returning.
    ///
    /// Returns the sequence number the mutation was issued under. A patch is
    /// only recorded when a value was cached.
    pub fn begin(&self, key: &CacheKey, mutation: &Mutation) -> (PreparedMutation, u64) {
        let seq = self.tick();
        self.with_entry(key, |entry| {
            let prepared = mutation.prepare(entry.value.as_ref(), seq);
            if let (Some(patch), Some(_)) = (&prepared.patch, &entry.value) {
                entry.pending.push(PendingWrite {
                    seq,
                    patch: patch.clone(),
                });
                entry.recompute();
                entry.publish();
                debug!(%key, seq, "optimistic patch applied");
            }
            (prepared, seq)
        })
    }

    /// Records a successful mutation issued under `seq`.
    ///
    /// A canonical value becomes the new base unless a mutation issued later
    /// already installed one. Without a usable canonical value the prediction
    /// is folded into the base, except for placeholder entities, which only a
    /// fetch can replace with real ones. Fetches issued before this point are
    /// stale either way.
    ///
    /// Returns `true` when the entry must be refetched to match the backend.
    pub fn confirm(&self, key: &CacheKey, seq: u64, canonical: Option<Resource>) -> bool {
        let ticket = self.tick();
        self.with_entry(key, |entry| {
            let patch = entry.take_pending(seq);
            let superseded = seq < entry.canonical_seq;
            let (base, needs_refetch) = match canonical.filter(|resource| resource.fits(key)) {
                Some(resource) if !superseded => {
                    entry.canonical_seq = seq;
                    (Some(resource), false)
                }
                Some(_) => {
                    debug!(%key, seq, newest = entry.canonical_seq, "canonical value superseded");
                    (entry.base.take(), true)
                }
                None => {
                    let base = entry.base.take();
                    match patch {
                        Some(patch) if !superseded && !patch.creates_placeholder() => {
                            (base.map(|base| patch.apply(base)), true)
                        }
                        _ => (base, true),
                    }
                }
            };
            entry.set_base(base, ticket);
            entry.publish();
            debug!(%key, seq, ticket, needs_refetch, "mutation confirmed");
            needs_refetch
        })
    }

    /// Drops a failed mutation's patch. The visible value is recomputed from
    /// the latest base, so with nothing else in flight it equals the value
    /// before the mutation began.
    pub fn rollback(&self, key: &CacheKey, seq: u64) {
        self.with_existing(key, |entry| {
            if entry.take_pending(seq).is_some() {
                entry.recompute();
                entry.publish();
                debug!(%key, seq, "optimistic patch rolled back");
            }
        });
    }

    /// Number of optimistic patches still waiting on the backend.
    pub fn pending_count(&self, key: &CacheKey) -> usize {
        self.lock().get(key).map_or(0, |entry| entry.pending.len())
    }
}
