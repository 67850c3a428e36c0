//! Optimistic patches.
//!
//! A mutation may edit cached query data before its network call resolves.
//! Each edit is recorded on a per-entry stack together with the data it
//! replaced, so that a failed mutation can put the entry back exactly as it
//! would have been without that edit, even when other patches landed on top
//! of it in the meantime.
//!
//! Patches behave as follows:
//!
//! - Rolling back a patch restores the snapshot taken when it was applied and
//!   reapplies every patch stacked after it, so later edits survive
//! - Committing a patch keeps its edit; once every patch below it is settled
//!   it is dropped from the stack
//! - When a fetch writes fresh data for an entry, still-pending patches are
//!   reapplied on top of it so in-flight mutations stay visible

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::cache::CacheStore;
use crate::client::QueryClient;
use crate::endpoint::RecipeFn;
use crate::key::RequestKey;

/// Handle to an applied optimistic edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimisticPatch {
    pub id: u64,
    pub target: RequestKey,
}

#[derive(Debug)]
struct AppliedPatch {
    id: u64,
    recipe: RecipeFn,
    args: Value,
    undo: Arc<Value>,
    committed: bool,
}

/// Per-entry stacks of applied patches.
#[derive(Debug, Default)]
pub(crate) struct PatchLedger {
    stacks: HashMap<RequestKey, Vec<AppliedPatch>>,
    next_id: u64,
}

impl PatchLedger {
    /// Applies `recipe` to the data cached under `target`.
    ///
    /// Returns `None` without recording anything when the entry is missing or
    /// has no data.
    pub(crate) fn apply(
        &mut self,
        store: &mut CacheStore,
        target: &RequestKey,
        recipe: RecipeFn,
        args: &Value,
    ) -> Option<OptimisticPatch> {
        let undo = store.patch(target, |data| recipe(data, args))?;
        self.next_id += 1;
        let id = self.next_id;
        self.stacks.entry(target.clone()).or_default().push(AppliedPatch {
            id,
            recipe,
            args: args.clone(),
            undo,
            committed: false,
        });
        debug!(key = %target, patch = id, "optimistic patch applied");
        Some(OptimisticPatch {
            id,
            target: target.clone(),
        })
    }

    pub(crate) fn commit(&mut self, patch: &OptimisticPatch) {
        let Some(stack) = self.stacks.get_mut(&patch.target) else {
            return;
        };
        if let Some(applied) = stack.iter_mut().find(|applied| applied.id == patch.id) {
            applied.committed = true;
        }
        prune(stack);
        if stack.is_empty() {
            self.stacks.remove(&patch.target);
        }
    }

    /// Undoes `patch`, keeping the effect of every patch applied after it.
    pub(crate) fn rollback(&mut self, store: &mut CacheStore, patch: &OptimisticPatch) {
        let Some(mut stack) = self.stacks.remove(&patch.target) else {
            return;
        };
        let Some(position) = stack.iter().position(|applied| applied.id == patch.id) else {
            self.stacks.insert(patch.target.clone(), stack);
            return;
        };

        let above: Vec<AppliedPatch> = stack.drain(position + 1..).collect();
        if let Some(undone) = stack.pop() {
            store.restore_data(&patch.target, undone.undo);
        }
        for mut applied in above {
            let (recipe, args) = (applied.recipe, &applied.args);
            if let Some(undo) = store.patch(&patch.target, |data| recipe(data, args)) {
                applied.undo = undo;
            }
            stack.push(applied);
        }
        prune(&mut stack);
        debug!(key = %patch.target, patch = patch.id, "optimistic patch rolled back");

        if !stack.is_empty() {
            self.stacks.insert(patch.target.clone(), stack);
        }
    }

    /// Reapplies pending patches on top of freshly fetched `data`.
    ///
    /// Committed patches are dropped: the server state already reflects them.
    pub(crate) fn rebase(&mut self, key: &RequestKey, data: Value) -> Arc<Value> {
        let mut current = Arc::new(data);
        let Some(stack) = self.stacks.get_mut(key) else {
            return current;
        };
        stack.retain(|applied| !applied.committed);
        for applied in stack.iter_mut() {
            let mut next = Value::clone(&current);
            (applied.recipe)(&mut next, &applied.args);
            applied.undo = std::mem::replace(&mut current, Arc::new(next));
        }
        if stack.is_empty() {
            self.stacks.remove(key);
        }
        current
    }

    /// Drops the stack for an evicted entry.
    pub(crate) fn forget(&mut self, key: &RequestKey) {
        self.stacks.remove(key);
    }

    pub(crate) fn clear(&mut self) {
        self.stacks.clear();
    }

    /// Number of patches still recorded for `key`.
    pub(crate) fn pending(&self, key: &RequestKey) -> usize {
        self.stacks.get(key).map_or(0, Vec::len)
    }
}

/// Committed patches at the bottom of a stack can never be rolled back
/// through, so they are dropped.
fn prune(stack: &mut Vec<AppliedPatch>) {
    let settled = stack.iter().take_while(|applied| applied.committed).count();
    stack.drain(..settled);
}

impl QueryClient {
    /// Applies `recipe` to the cached data under `target`.
    ///
    /// Returns `None` when there is nothing cached to patch.
    pub fn apply_optimistic(&self, target: &RequestKey, recipe: RecipeFn, args: &Value) -> Option<OptimisticPatch> {
        self.with_state("apply_optimistic", |state| {
            state.patches.apply(&mut state.store, target, recipe, args)
        })
    }

    /// Keeps the edit made by `patch`.
    pub fn commit_optimistic(&self, patch: &OptimisticPatch) {
        self.with_state("commit_optimistic", |state| state.patches.commit(patch));
    }

    /// Reverts the edit made by `patch`.
    pub fn rollback_optimistic(&self, patch: &OptimisticPatch) {
        self.with_state("rollback_optimistic", |state| {
            state.patches.rollback(&mut state.store, patch);
        });
    }

    /// Number of uncommitted or not yet pruned patches on `key`.
    #[must_use]
    pub fn pending_patches(&self, key: &RequestKey) -> usize {
        self.lock_state("pending_patches").patches.pending(key)
    }
}
