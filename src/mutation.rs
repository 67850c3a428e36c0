//! Mutations and tag invalidation.
//!
//! Mutations are one-off writes. They are never cached; instead, a successful
//! mutation invalidates the tags it declares, and every subscribed entry
//! providing one of those tags is refetched (bypassing the freshness check).
//!
//! A mutation may also declare optimistic updates. They are applied to the
//! target entries before the network call starts and rolled back if the call
//! fails. See [`optimistic`](crate::optimistic).
//!
//! # Example
//!
//! ```rust,ignore
//! use kennel::prelude::*;
//!
//! let result = client.mutate(&api.remove_dog, DogId::from(5)).await;
//! match result.state {
//!     MutationState::Success(_) => println!("refetched {:?}", result.refetched),
//!     MutationState::Error(err) => eprintln!("remove failed: {err}"),
//! }
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::MutationEndpoint;
use crate::client::{FetchMode, QueryClient};
use crate::error::QueryError;
use crate::key::{RequestKey, Tag};
use crate::optimistic::OptimisticPatch;

/// How a mutation settled.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationState<T> {
    /// Mutation succeeded with a result.
    Success(T),
    /// Mutation failed with an error.
    Error(QueryError),
}

/// A settled mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationResult<T> {
    /// The current state of the mutation.
    pub state: MutationState<T>,
    /// Keys refetched because of the tags this mutation invalidated, sorted.
    pub refetched: Vec<RequestKey>,
}

impl<T> MutationResult<T> {
    const fn settled(state: MutationState<T>) -> Self {
        Self {
            state,
            refetched: Vec::new(),
        }
    }

    /// Returns the result data if the mutation succeeded, otherwise `None`.
    pub const fn data(&self) -> Option<&T> {
        match &self.state {
            MutationState::Success(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the error if the mutation failed.
    pub const fn error(&self) -> Option<&QueryError> {
        match &self.state {
            MutationState::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Returns `true` if the mutation succeeded.
    pub const fn is_success(&self) -> bool {
        matches!(self.state, MutationState::Success(_))
    }

    /// Returns `true` if the mutation failed.
    pub const fn is_error(&self) -> bool {
        matches!(self.state, MutationState::Error(_))
    }
}

impl QueryClient {
    /// Runs a mutation.
    ///
    /// Optimistic updates are applied before the request is sent. On success
    /// they are committed, the declared tags are invalidated and the affected
    /// subscribed entries are refetched before this returns. On failure they
    /// are rolled back and nothing is invalidated.
    pub async fn mutate<A: Into<Value>>(
        &self,
        endpoint: &MutationEndpoint<A>,
        args: A,
    ) -> MutationResult<Arc<Value>> {
        if self.is_disposed() {
            return MutationResult::settled(MutationState::Error(QueryError::Disposed));
        }

        let resolved = endpoint.resolved().clone();
        let definition = &resolved.definition;
        let args = args.into();

        let patches: Vec<OptimisticPatch> = resolved
            .updates
            .iter()
            .filter_map(|update| {
                let target = RequestKey::new(update.target.name, &(update.target_args)(&args));
                self.apply_optimistic(&target, update.recipe, &args)
            })
            .collect();

        debug!(mutation = definition.name, optimistic = patches.len(), "mutation started");
        match self.send((definition.request)(&args)).await {
            Ok(data) => {
                for patch in &patches {
                    self.commit_optimistic(patch);
                }
                let tags = definition.invalidates.resolve(Some(&data), &args);
                let refetched = self.invalidate_tags(tags).await;
                MutationResult {
                    state: MutationState::Success(Arc::new(data)),
                    refetched,
                }
            }
            Err(err) => {
                warn!(mutation = definition.name, error = %err, "mutation failed");
                for patch in patches.iter().rev() {
                    self.rollback_optimistic(patch);
                }
                MutationResult::settled(MutationState::Error(err))
            }
        }
    }

    /// Invalidates `tags` and refetches every subscribed entry providing one
    /// of them, each exactly once.
    ///
    /// Cached entries nobody is subscribed to are marked stale instead, so the
    /// next query for them goes to the network. Returns the refetched keys,
    /// sorted.
    pub async fn invalidate_tags<I, T>(&self, tags: I) -> Vec<RequestKey>
    where
        I: IntoIterator<Item = T>,
        T: Into<Tag>,
    {
        let tags: BTreeSet<Tag> = tags.into_iter().map(Into::into).collect();
        if tags.is_empty() || self.is_disposed() {
            return Vec::new();
        }

        let mut targets = self.with_state("invalidate_tags", |state| {
            let mut targets = Vec::new();
            for key in state.store.resolve_tags(&tags) {
                let Some(entry) = state.store.get(&key) else {
                    continue;
                };
                match (entry.origin.clone(), entry.subscriber_count > 0) {
                    (Some(origin), true) => targets.push((key, origin)),
                    _ => {
                        state.store.update(&key, |entry| entry.mark_stale());
                    }
                }
            }
            targets
        });
        targets.sort_by(|a, b| a.0.cmp(&b.0));

        info!(
            tags = ?tags.iter().map(Tag::as_str).collect::<Vec<_>>(),
            refetching = targets.len(),
            "tags invalidated"
        );

        let keys: Vec<RequestKey> = targets.iter().map(|(key, _)| key.clone()).collect();
        join_all(
            targets
                .iter()
                .map(|(_, origin)| self.fetch(&origin.definition, origin.args.clone(), FetchMode::Force)),
        )
        .await;
        keys
    }
}
