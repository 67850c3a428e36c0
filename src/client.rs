//! The query client: cache store owner and fetch coordinator.
//!
//! [`QueryClient`] is the single entry point consumers use. It owns the cache
//! store, tag index and optimistic patch ledger behind one mutex so that each
//! operation sees and leaves them consistent, and it deduplicates fetches so
//! that at most one network call per [`RequestKey`] is in flight.
//!
//! # Fetch flow
//!
//! 1. Compute the request key from the endpoint name and arguments
//! 2. If the cached entry is fresh (and the call is not forced), return it
//! 3. If a fetch for the key is already in flight, await that one. A forced
//!    fetch instead queues a single follow-up that starts once the in-flight
//!    one settles, since that one may have been requested before whatever
//!    made the caller force a refetch
//! 4. Otherwise mark the entry loading, spawn the network call, and settle the
//!    entry with its data or error when the call completes
//!
//! Fetches run as spawned tasks, so a caller (or subscriber) going away does
//! not abort the network call; the result is still cached.
//!
//! # Example
//!
//! ```rust,ignore
//! use kennel::prelude::*;
//!
//! let client = QueryClient::new(HttpTransport::new("https://example.com/api")?, ClientConfig::default());
//! let api = BoardingApi::new()?;
//!
//! let dogs = client.query(&api.get_dogs, ()).await;
//! if let Some(data) = dogs.data() {
//!     println!("{} dogs", data.as_object().map_or(0, |m| m.len()));
//! }
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::api::QueryEndpoint;
use crate::cache::entry::QueryOrigin;
use crate::cache::store::CacheEvent;
use crate::cache::{CacheEntry, CacheStore, QueryStatus};
use crate::config::ClientConfig;
use crate::endpoint::{QueryDefinition, RequestSpec};
use crate::error::QueryError;
use crate::key::RequestKey;
use crate::lock::mutex_lock;
use crate::optimistic::PatchLedger;
use crate::transport::{Request, Transport};

/// Everything guarded by the client's state mutex.
#[derive(Debug, Default)]
pub(crate) struct CacheState {
    pub(crate) store: CacheStore,
    pub(crate) patches: PatchLedger,
}

type SharedFetch = Shared<BoxFuture<'static, CacheEntry>>;

/// The fetch in flight for a key, and the forced refetch queued behind it.
struct InFlight {
    current: SharedFetch,
    follow_up: Option<SharedFetch>,
}

pub(crate) struct Inner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    state: Mutex<CacheState>,
    in_flight: DashMap<RequestKey, InFlight>,
    events: broadcast::Sender<CacheEvent>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) timer_generation: AtomicU64,
    disposed: AtomicBool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchMode {
    /// Answer from a fresh cached entry when possible.
    CacheFirst,
    /// Skip the freshness check (invalidation, refetch sweeps, manual refetch).
    Force,
}

/// Handle to a query cache. Cheap to clone; clones share the same cache.
#[derive(Clone)]
pub struct QueryClient {
    pub(crate) inner: Arc<Inner>,
}

impl QueryClient {
    /// Creates a client (and its empty cache) around `transport`.
    #[must_use]
    pub fn new(transport: impl Transport, config: ClientConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                config,
                transport: Arc::new(transport),
                state: Mutex::new(CacheState::default()),
                in_flight: DashMap::new(),
                events,
                shutdown: CancellationToken::new(),
                timer_generation: AtomicU64::new(0),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Snapshot of the cached entry for `key`.
    #[must_use]
    pub fn entry(&self, key: &RequestKey) -> Option<CacheEntry> {
        self.lock_state("entry").store.get(key).cloned()
    }

    /// Keys of every cached entry, sorted.
    #[must_use]
    pub fn cached_keys(&self) -> Vec<RequestKey> {
        let mut keys: Vec<_> = self
            .lock_state("cached_keys")
            .store
            .entries()
            .map(|entry| entry.key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Receiver for every cache change notification.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    /// Returns the cached entry if fresh, otherwise fetches it.
    ///
    /// Concurrent calls for the same endpoint and arguments share a single
    /// network call. Failures settle the entry with an error status rather
    /// than being returned as `Err`.
    pub async fn query<A: Into<Value>>(&self, endpoint: &QueryEndpoint<A>, args: A) -> CacheEntry {
        self.fetch(endpoint.definition(), args.into(), FetchMode::CacheFirst)
            .await
    }

    /// Fetches regardless of what is cached.
    ///
    /// If a fetch for the same key is in flight, one more fetch is issued
    /// after it settles; concurrent forced calls share that follow-up.
    pub async fn refetch<A: Into<Value>>(&self, endpoint: &QueryEndpoint<A>, args: A) -> CacheEntry {
        self.fetch(endpoint.definition(), args.into(), FetchMode::Force)
            .await
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Drops every cached entry, pending eviction timer and optimistic patch.
    ///
    /// The client stays usable. Fetches already in flight still settle and
    /// write their results.
    pub fn reset(&self) {
        let drained = self.with_state("reset", |state| {
            state.patches.clear();
            state.store.clear()
        });
        for entry in &drained {
            if let Some(timer) = &entry.eviction {
                timer.cancel();
            }
        }
        info!(entries = drained.len(), "query cache reset");
    }

    /// Tears the client down: stops eviction timers and refetch listeners and
    /// clears the cache. Later queries and mutations settle with
    /// [`QueryError::Disposed`].
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.shutdown.cancel();
        self.reset();
        info!("query client disposed");
    }

    pub(crate) fn lock_state(&self, op: &'static str) -> MutexGuard<'_, CacheState> {
        mutex_lock(&self.inner.state, "client", op)
    }

    /// Runs `f` under the state lock, then broadcasts the store's queued events.
    pub(crate) fn with_state<R>(&self, op: &'static str, f: impl FnOnce(&mut CacheState) -> R) -> R {
        let mut state = self.lock_state(op);
        let out = f(&mut state);
        let events = state.store.take_events();
        drop(state);
        for event in events {
            // No receivers is fine
            let _ = self.inner.events.send(event);
        }
        out
    }

    /// Merges default headers, the optional request id, and the request's own headers.
    pub(crate) fn prepare(&self, spec: RequestSpec) -> Request {
        let config = &self.inner.config;
        let mut headers = config.default_headers.clone();
        if let Some(name) = &config.request_id_header {
            headers.insert(name.clone(), Uuid::new_v4().to_string());
        }
        headers.extend(spec.headers);
        Request {
            method: spec.method,
            path: spec.path,
            headers,
            body: spec.body,
        }
    }

    pub(crate) async fn send(&self, spec: RequestSpec) -> Result<Value, QueryError> {
        let request = self.prepare(spec);
        self.inner.transport.send(request).await?.into_result()
    }

    pub(crate) fn keep_unused_for(&self, definition: &QueryDefinition) -> std::time::Duration {
        definition
            .keep_unused_for
            .unwrap_or(self.inner.config.keep_unused_for)
    }

    pub(crate) async fn fetch(
        &self,
        definition: &Arc<QueryDefinition>,
        args: Value,
        mode: FetchMode,
    ) -> CacheEntry {
        let key = RequestKey::new(definition.name, &args);
        if self.is_disposed() {
            return CacheEntry::failed(key, QueryError::Disposed);
        }

        if mode == FetchMode::CacheFirst {
            if let Some(entry) = self.entry(&key).filter(CacheEntry::is_fresh) {
                debug!(key = %key, "cache hit");
                return entry;
            }
        }

        let pending = match self.inner.in_flight.entry(key.clone()) {
            Entry::Occupied(mut slot) => match mode {
                FetchMode::CacheFirst => {
                    debug!(key = %key, "joining in-flight fetch");
                    slot.get().current.clone()
                }
                FetchMode::Force => {
                    let in_flight = slot.get_mut();
                    let current = in_flight.current.clone();
                    in_flight
                        .follow_up
                        .get_or_insert_with(|| {
                            debug!(key = %key, "refetch queued behind in-flight fetch");
                            self.queue_follow_up(current, definition.clone(), args)
                        })
                        .clone()
                }
            },
            Entry::Vacant(slot) => {
                let shared = self.start_fetch(key.clone(), definition, args);
                slot.insert(InFlight {
                    current: shared.clone(),
                    follow_up: None,
                });
                shared
            }
        };

        pending.await
    }

    /// Waits for `current` to settle, then joins or starts a fetch for the key.
    ///
    /// Whatever is in flight by then was started after `current` settled, so
    /// joining it is as good as a new request.
    fn queue_follow_up(&self, current: SharedFetch, definition: Arc<QueryDefinition>, args: Value) -> SharedFetch {
        let key = RequestKey::new(definition.name, &args);
        let client = self.clone();
        let slot_key = key.clone();
        let task = tokio::spawn(async move {
            current.await;
            if client.is_disposed() {
                return CacheEntry::failed(slot_key, QueryError::Disposed);
            }
            let pending = match client.inner.in_flight.entry(slot_key.clone()) {
                Entry::Occupied(slot) => slot.get().current.clone(),
                Entry::Vacant(slot) => {
                    let shared = client.start_fetch(slot_key, &definition, args);
                    slot.insert(InFlight {
                        current: shared.clone(),
                        follow_up: None,
                    });
                    shared
                }
            };
            pending.await
        });
        Self::share(key, task, None)
    }

    /// Marks the entry loading and spawns the network call.
    fn start_fetch(&self, key: RequestKey, definition: &Arc<QueryDefinition>, args: Value) -> SharedFetch {
        let requested_at = self.begin_fetch(&key, definition, &args);
        let task = tokio::spawn(
            self.clone()
                .run_fetch(definition.clone(), args, key.clone(), requested_at),
        );
        Self::share(key, task, Some(self.clone()))
    }

    /// Wraps a fetch task so any number of callers can await it. When `owner`
    /// is set, a task that died without settling settles the entry with the
    /// failure and frees the key's slot.
    fn share(key: RequestKey, task: JoinHandle<CacheEntry>, owner: Option<Self>) -> SharedFetch {
        async move {
            match task.await {
                Ok(entry) => entry,
                Err(err) => {
                    let error = QueryError::Network(format!("fetch task failed: {err}"));
                    let Some(client) = owner else {
                        return CacheEntry::failed(key, error);
                    };
                    let settled = client.with_state("fetch_task_failed", |state| {
                        state.store.update(&key, |entry| {
                            if entry.is_loading() {
                                entry.settle_error(error.clone());
                            }
                        });
                        let snapshot = state.store.get(&key).cloned();
                        client.schedule_eviction(state, &key);
                        snapshot
                    });
                    client.inner.in_flight.remove(&key);
                    settled.unwrap_or_else(|| CacheEntry::failed(key, error))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Returns the entry's invalidation count at the time of the request.
    fn begin_fetch(&self, key: &RequestKey, definition: &Arc<QueryDefinition>, args: &Value) -> u64 {
        let keep_unused_for = self.keep_unused_for(definition);
        self.with_state("begin_fetch", |state| {
            state.store.upsert(key, |entry| {
                entry.status = QueryStatus::Loading;
                entry.keep_unused_for = keep_unused_for;
                entry.origin = Some(QueryOrigin {
                    definition: definition.clone(),
                    args: args.clone(),
                });
                entry.invalidations
            })
        })
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn run_fetch(
        self,
        definition: Arc<QueryDefinition>,
        args: Value,
        key: RequestKey,
        requested_at: u64,
    ) -> CacheEntry {
        let request = self.prepare((definition.request)(&args));
        let outcome = match self.inner.transport.send(request).await {
            Ok(response) => catch_unwind(AssertUnwindSafe(|| definition.decode(response)))
                .unwrap_or_else(|panic| Err(QueryError::Transform(panic_message(&*panic)))),
            Err(err) => Err(err),
        };
        match &outcome {
            Ok(_) => debug!("fetch succeeded"),
            Err(err) => warn!(error = %err, "fetch failed"),
        }

        let settled = self.with_state("complete_fetch", |state| {
            if self.is_disposed() {
                return CacheEntry::failed(key.clone(), QueryError::Disposed);
            }
            let tags = definition.provides.resolve(outcome.as_ref().ok(), &args);
            state.store.upsert(&key, |entry| {
                match outcome {
                    Ok(data) => {
                        entry.settle_fetched(state.patches.rebase(&key, data), requested_at);
                        entry.tags = tags.into_iter().collect();
                    }
                    Err(err) => {
                        entry.settle_error(err);
                        entry.tags.extend(tags);
                    }
                }
                if entry.origin.is_none() {
                    entry.origin = Some(QueryOrigin {
                        definition: definition.clone(),
                        args: args.clone(),
                    });
                }
            });
            let snapshot = state.store.get(&key).cloned();
            self.schedule_eviction(state, &key);
            snapshot.unwrap_or_else(|| CacheEntry::new(key.clone()))
        });

        self.inner.in_flight.remove(&key);
        settled
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "transform panicked".to_string())
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("config", &self.inner.config)
            .field("in_flight", &self.inner.in_flight.len())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
