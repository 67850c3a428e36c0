use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::endpoint::QueryDefinition;
use crate::error::QueryError;
use crate::key::{RequestKey, Tag};
use crate::subscription::EvictionTimer;

/// Lifecycle of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    /// Known to the cache (e.g. subscribed) but never fetched.
    #[default]
    Uninitialized,
    /// A fetch is in flight.
    Loading,
    /// The last fetch succeeded.
    Success,
    /// The last fetch failed.
    Error,
}

/// The endpoint and arguments an entry was requested with, kept so the entry
/// can be refetched by invalidation or a refetch sweep.
#[derive(Debug, Clone)]
pub(crate) struct QueryOrigin {
    pub(crate) definition: Arc<QueryDefinition>,
    pub(crate) args: Value,
}

/// A cached query result with status and bookkeeping.
///
/// Entries handed out by the client are snapshots; editing one does not touch
/// the store.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: RequestKey,
    pub status: QueryStatus,
    /// Last successful data. Kept while refetching and after a failed refetch.
    pub data: Option<Arc<Value>>,
    pub error: Option<QueryError>,
    pub tags: BTreeSet<Tag>,
    pub last_updated: Option<DateTime<Utc>>,
    pub subscriber_count: usize,
    /// Set when a tag this entry provides was invalidated while nobody was
    /// subscribed; the next query refetches instead of hitting the cache.
    pub is_stale: bool,
    /// Bumped by every [`mark_stale`](Self::mark_stale).
    pub(crate) invalidations: u64,
    pub(crate) data_revision: u64,
    pub(crate) keep_unused_for: Duration,
    pub(crate) origin: Option<QueryOrigin>,
    pub(crate) eviction: Option<EvictionTimer>,
}

impl CacheEntry {
    /// Creates an uninitialized entry for the given key.
    #[must_use]
    pub fn new(key: RequestKey) -> Self {
        Self {
            key,
            status: QueryStatus::Uninitialized,
            data: None,
            error: None,
            tags: BTreeSet::new(),
            last_updated: None,
            subscriber_count: 0,
            is_stale: false,
            invalidations: 0,
            data_revision: 0,
            keep_unused_for: Duration::ZERO,
            origin: None,
            eviction: None,
        }
    }

    /// An entry that settled with `error` without ever reaching the store.
    pub(crate) fn failed(key: RequestKey, error: QueryError) -> Self {
        let mut entry = Self::new(key);
        entry.settle_error(error);
        entry
    }

    /// Returns the data if any has been fetched.
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        self.data.as_deref()
    }

    #[must_use]
    pub fn is_uninitialized(&self) -> bool {
        self.status == QueryStatus::Uninitialized
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    /// Successful and not invalidated since; a query may answer from cache.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.is_success() && !self.is_stale
    }

    /// Marks this entry as stale.
    pub const fn mark_stale(&mut self) {
        self.is_stale = true;
        self.invalidations = self.invalidations.wrapping_add(1);
    }

    pub(crate) fn settle_success(&mut self, data: impl Into<Arc<Value>>) {
        self.status = QueryStatus::Success;
        self.data = Some(data.into());
        self.error = None;
        self.is_stale = false;
        self.last_updated = Some(Utc::now());
    }

    /// Settles with data fetched by a request made when the entry had seen
    /// `requested_at` invalidations. Stays stale if it was invalidated since.
    pub(crate) fn settle_fetched(&mut self, data: impl Into<Arc<Value>>, requested_at: u64) {
        self.settle_success(data);
        self.is_stale = self.invalidations != requested_at;
    }

    pub(crate) fn settle_error(&mut self, error: QueryError) {
        self.status = QueryStatus::Error;
        self.error = Some(error);
        self.last_updated = Some(Utc::now());
    }
}
