//! Memoized derived values.
//!
//! A [`Selector`] combines one or more inputs (cached query data or local
//! state) through a pure compute function. The result is memoized together
//! with the identity of every input it was computed from; [`Selector::value`]
//! recomputes only when at least one identity changed, and then exactly once.
//!
//! Identity is the data revision, not structural equality: writing equal data
//! again still counts as a change, and status-only updates (loading,
//! subscriber counts) never do.
//!
//! # Example
//!
//! ```rust,ignore
//! use kennel::prelude::*;
//!
//! let filter = LocalState::new(json!("large"));
//! let large_dogs = client.define_selector(
//!     vec![api.get_dogs.select(()), SelectorInput::Local(filter.clone())],
//!     |inputs| count_matching(inputs[0].as_deref(), inputs[1].as_deref()),
//! );
//!
//! let count = large_dogs.value();
//! ```

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::trace;

use crate::client::QueryClient;
use crate::key::RequestKey;
use crate::lock::mutex_lock;

/// Externally owned state a selector can depend on.
///
/// Clones share the same value.
#[derive(Clone)]
pub struct LocalState {
    inner: Arc<Mutex<(u64, Arc<Value>)>>,
}

impl LocalState {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self {
            inner: Arc::new(Mutex::new((0, Arc::new(value)))),
        }
    }

    #[must_use]
    pub fn get(&self) -> Arc<Value> {
        mutex_lock(&self.inner, "selector::local", "get").1.clone()
    }

    /// Replaces the value. Selectors reading it recompute on their next read.
    pub fn set(&self, value: Value) {
        let mut guard = mutex_lock(&self.inner, "selector::local", "set");
        guard.0 += 1;
        guard.1 = Arc::new(value);
    }

    fn snapshot(&self) -> (u64, Arc<Value>) {
        let guard = mutex_lock(&self.inner, "selector::local", "snapshot");
        (guard.0, guard.1.clone())
    }
}

impl fmt::Debug for LocalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LocalState").field(&self.get()).finish()
    }
}

/// Where a selector reads one of its inputs from.
#[derive(Debug, Clone)]
pub enum SelectorInput {
    /// Data cached under a request key. Missing or not yet fetched data reads
    /// as `None`.
    Query(RequestKey),
    Local(LocalState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Identity {
    Missing,
    Entry(u64),
    Local(u64),
}

type ComputeFn<T> = dyn Fn(&[Option<Arc<Value>>]) -> T + Send + Sync;

/// A memoized computation over cache entries and local state.
pub struct Selector<T> {
    client: QueryClient,
    inputs: Vec<SelectorInput>,
    compute: Box<ComputeFn<T>>,
    memo: Mutex<Option<(Vec<Identity>, T)>>,
    recomputations: AtomicUsize,
}

impl<T: Clone> Selector<T> {
    /// Returns the memoized result, recomputing only if an input changed.
    pub fn value(&self) -> T {
        let (identities, values) = self.read_inputs();

        let mut memo = mutex_lock(&self.memo, "selector", "value");
        if let Some((seen, result)) = memo.as_ref() {
            if *seen == identities {
                return result.clone();
            }
        }

        let result = (self.compute)(&values);
        self.recomputations.fetch_add(1, Ordering::Relaxed);
        trace!(inputs = self.inputs.len(), "selector recomputed");
        *memo = Some((identities, result.clone()));
        result
    }
}

impl<T> Selector<T> {
    /// How many times the compute function has run.
    #[must_use]
    pub fn recomputations(&self) -> usize {
        self.recomputations.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn inputs(&self) -> &[SelectorInput] {
        &self.inputs
    }

    fn read_inputs(&self) -> (Vec<Identity>, Vec<Option<Arc<Value>>>) {
        let state = self.client.lock_state("selector");
        self.inputs
            .iter()
            .map(|input| match input {
                SelectorInput::Query(key) => match state.store.get(key).and_then(|entry| {
                    entry.data.clone().map(|data| (entry.data_revision, data))
                }) {
                    Some((revision, data)) => (Identity::Entry(revision), Some(data)),
                    None => (Identity::Missing, None),
                },
                SelectorInput::Local(local) => {
                    let (revision, value) = local.snapshot();
                    (Identity::Local(revision), Some(value))
                }
            })
            .unzip()
    }
}

impl<T> fmt::Debug for Selector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selector")
            .field("inputs", &self.inputs)
            .field("recomputations", &self.recomputations())
            .finish_non_exhaustive()
    }
}

impl QueryClient {
    /// Defines a memoized selector over `inputs`.
    ///
    /// `compute` receives one slot per input, in order. It must be pure; the
    /// cache is not writable from inside it.
    pub fn define_selector<T, F>(&self, inputs: Vec<SelectorInput>, compute: F) -> Selector<T>
    where
        F: Fn(&[Option<Arc<Value>>]) -> T + Send + Sync + 'static,
    {
        Selector {
            client: self.clone(),
            inputs,
            compute: Box::new(compute),
            memo: Mutex::new(None),
            recomputations: AtomicUsize::new(0),
        }
    }
}
