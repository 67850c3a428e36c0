//! Subscriptions and idle eviction.
//!
//! A [`Subscription`] keeps a cache entry alive. Each entry counts its
//! subscribers; when the count drops to zero the entry is scheduled for
//! eviction after its idle window. Subscribing again before the window
//! elapses cancels the pending eviction.
//!
//! Eviction timers are cancellable tasks. Every timer is a child of the
//! client's shutdown token, so disposing the client stops them all.
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use kennel::prelude::*;
//!
//! let sub = client.subscribe(&api.get_dogs, ());
//! let entry = sub.ready().await;
//!
//! let mut changes = sub.changes();
//! while let Some(entry) = changes.next().await {
//!     println!("{:?}: {:?}", entry.status, entry.data());
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::Ordering;

use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::QueryEndpoint;
use crate::cache::entry::QueryOrigin;
use crate::cache::{CacheEntry, CacheEvent};
use crate::client::{CacheState, FetchMode, QueryClient};
use crate::endpoint::QueryDefinition;
use crate::key::RequestKey;

/// Pending eviction for an idle entry.
#[derive(Debug, Clone)]
pub(crate) struct EvictionTimer {
    token: CancellationToken,
    generation: u64,
}

impl EvictionTimer {
    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }
}

/// A live interest in one (endpoint, arguments) pair.
///
/// Dropping the subscription (or calling [`unsubscribe`](Self::unsubscribe))
/// releases it.
pub struct Subscription {
    client: QueryClient,
    key: RequestKey,
    definition: Arc<QueryDefinition>,
    args: Value,
    released: bool,
}

impl Subscription {
    #[must_use]
    pub const fn key(&self) -> &RequestKey {
        &self.key
    }

    /// Current snapshot of the subscribed entry.
    #[must_use]
    pub fn entry(&self) -> Option<CacheEntry> {
        self.client.entry(&self.key)
    }

    /// Waits until the entry has settled, fetching it if it is not fresh.
    pub async fn ready(&self) -> CacheEntry {
        self.client
            .fetch(&self.definition, self.args.clone(), FetchMode::CacheFirst)
            .await
    }

    /// Fetches the entry regardless of freshness.
    pub async fn refetch(&self) -> CacheEntry {
        self.client
            .fetch(&self.definition, self.args.clone(), FetchMode::Force)
            .await
    }

    /// Snapshots of the entry every time it changes.
    ///
    /// Notifications missed because the receiver lagged are skipped; the next
    /// snapshot still reflects the latest state.
    #[must_use]
    pub fn changes(&self) -> BoxStream<'static, CacheEntry> {
        let client = self.client.clone();
        let key = self.key.clone();
        BroadcastStream::new(self.client.events())
            .filter_map(move |event| {
                let snapshot = match event {
                    Ok(CacheEvent::Updated(changed)) if changed == key => client.entry(&key),
                    _ => None,
                };
                futures::future::ready(snapshot)
            })
            .boxed()
    }

    /// Releases this subscription now.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.client.release(&self.key);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("released", &self.released)
            .finish()
    }
}

impl QueryClient {
    /// Subscribes to an (endpoint, arguments) pair.
    ///
    /// Increments the entry's subscriber count and cancels any pending
    /// eviction. If the entry is neither fresh nor loading, a fetch is started
    /// in the background; use [`Subscription::ready`] to wait for it.
    pub fn subscribe<A: Into<Value>>(&self, endpoint: &QueryEndpoint<A>, args: A) -> Subscription {
        let definition = endpoint.definition().clone();
        let args = args.into();
        let key = RequestKey::new(definition.name, &args);
        let keep_unused_for = self.keep_unused_for(&definition);

        let needs_fetch = !self.is_disposed()
            && self.with_state("subscribe", |state| {
                state.store.upsert(&key, |entry| {
                    entry.subscriber_count += 1;
                    if let Some(timer) = entry.eviction.take() {
                        timer.cancel();
                    }
                    entry.keep_unused_for = keep_unused_for;
                    entry.origin = Some(QueryOrigin {
                        definition: definition.clone(),
                        args: args.clone(),
                    });
                    debug!(key = %key, subscribers = entry.subscriber_count, "subscribed");
                    !entry.is_fresh() && !entry.is_loading()
                })
            });

        if needs_fetch {
            if let Ok(runtime) = Handle::try_current() {
                let client = self.clone();
                let definition = definition.clone();
                let args = args.clone();
                runtime.spawn(async move {
                    client.fetch(&definition, args, FetchMode::CacheFirst).await;
                });
            }
        }

        Subscription {
            client: self.clone(),
            key,
            definition,
            args,
            released: false,
        }
    }

    /// Releases `subscription`. Same as dropping it.
    pub fn unsubscribe(&self, subscription: Subscription) {
        subscription.unsubscribe();
    }

    /// Number of live subscriptions on `key`.
    #[must_use]
    pub fn subscriber_count(&self, key: &RequestKey) -> usize {
        self.lock_state("subscriber_count")
            .store
            .get(key)
            .map_or(0, |entry| entry.subscriber_count)
    }

    pub(crate) fn release(&self, key: &RequestKey) {
        self.with_state("release", |state| {
            let remaining = state.store.update(key, |entry| {
                if entry.subscriber_count == 0 {
                    warn!(key = %key, "unsubscribe without a matching subscribe");
                }
                entry.subscriber_count = entry.subscriber_count.saturating_sub(1);
                entry.subscriber_count
            });
            debug!(key = %key, subscribers = ?remaining, "unsubscribed");
            if remaining == Some(0) {
                self.schedule_eviction(state, key);
            }
        });
    }

    /// Starts the idle timer for `key` if nothing keeps the entry alive.
    pub(crate) fn schedule_eviction(&self, state: &mut CacheState, key: &RequestKey) {
        let Some(entry) = state.store.get(key) else {
            return;
        };
        if entry.subscriber_count > 0 || entry.is_loading() {
            return;
        }

        let window = entry.keep_unused_for;
        let runtime = match Handle::try_current() {
            Ok(runtime) if !window.is_zero() && !self.is_disposed() => runtime,
            _ => {
                evict(state, key);
                return;
            }
        };

        let generation = self.inner.timer_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let token = self.inner.shutdown.child_token();
        let timer = EvictionTimer {
            token: token.clone(),
            generation,
        };
        state.store.update(key, |entry| {
            if let Some(previous) = entry.eviction.replace(timer) {
                previous.cancel();
            }
        });

        let client = self.clone();
        let key = key.clone();
        debug!(key = %key, ?window, "eviction scheduled");
        runtime.spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(window) => client.evict_if_idle(&key, generation),
            }
        });
    }

    fn evict_if_idle(&self, key: &RequestKey, generation: u64) {
        self.with_state("evict_if_idle", |state| {
            let idle = state.store.get(key).is_some_and(|entry| {
                entry.subscriber_count == 0
                    && !entry.is_loading()
                    && entry
                        .eviction
                        .as_ref()
                        .is_some_and(|timer| timer.generation == generation)
            });
            if idle {
                evict(state, key);
            }
        });
    }
}

fn evict(state: &mut CacheState, key: &RequestKey) {
    if let Some(entry) = state.store.remove(key) {
        if let Some(timer) = &entry.eviction {
            timer.cancel();
        }
        state.patches.forget(key);
        debug!(key = %key, "entry evicted");
    }
}
