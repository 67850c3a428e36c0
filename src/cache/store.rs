//! The cache store.
//!
//! Owns every [`CacheEntry`] and keeps the [`TagIndex`] in step with each
//! entry's tag set. Every data change bumps the revision selectors use for
//! identity checks, and every write queues a [`CacheEvent`] for the client to
//! broadcast.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

use crate::key::{RequestKey, Tag};

use super::entry::CacheEntry;
use super::tags::TagIndex;

/// Change notification for a single key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Updated(RequestKey),
    Removed(RequestKey),
}

#[derive(Debug, Default)]
pub struct CacheStore {
    entries: HashMap<RequestKey, CacheEntry>,
    tags: TagIndex,
    next_revision: u64,
    pending: Vec<CacheEvent>,
}

impl CacheStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &RequestKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &RequestKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Writes `entry` under its key, replacing any previous entry (last write wins).
    pub fn put(&mut self, mut entry: CacheEntry) {
        let unchanged = self
            .entries
            .get(&entry.key)
            .and_then(|prev| match (&prev.data, &entry.data) {
                (Some(old), Some(new)) if Arc::ptr_eq(old, new) => Some(prev.data_revision),
                (None, None) => Some(prev.data_revision),
                _ => None,
            });
        entry.data_revision = match unchanged {
            Some(revision) => revision,
            None => self.bump_revision(),
        };
        self.tags.register(&entry.key, &entry.tags);
        self.pending.push(CacheEvent::Updated(entry.key.clone()));
        self.entries.insert(entry.key.clone(), entry);
    }

    /// Applies `f` to the entry for `key`, creating an uninitialized entry first
    /// if none exists. Goes through [`put`](Self::put) so tags and revision stay
    /// consistent.
    pub fn upsert<R>(&mut self, key: &RequestKey, f: impl FnOnce(&mut CacheEntry) -> R) -> R {
        let mut entry = self
            .entries
            .get(key)
            .cloned()
            .unwrap_or_else(|| CacheEntry::new(key.clone()));
        let out = f(&mut entry);
        self.put(entry);
        out
    }

    /// Applies `f` to an existing entry. Returns `None` when `key` is absent.
    pub fn update<R>(&mut self, key: &RequestKey, f: impl FnOnce(&mut CacheEntry) -> R) -> Option<R> {
        let mut entry = self.entries.get(key).cloned()?;
        let out = f(&mut entry);
        self.put(entry);
        Some(out)
    }

    /// Applies an in-place update to the entry's data and returns the prior
    /// snapshot for rollback.
    ///
    /// Returns `None` (and leaves the store untouched) when the entry is
    /// missing or has no data yet.
    pub fn patch(&mut self, key: &RequestKey, f: impl FnOnce(&mut Value)) -> Option<Arc<Value>> {
        let prior = self.entries.get(key)?.data.clone()?;
        let revision = self.bump_revision();
        let entry = self.entries.get_mut(key)?;
        let mut next = Value::clone(&prior);
        f(&mut next);
        entry.data = Some(Arc::new(next));
        entry.data_revision = revision;
        self.pending.push(CacheEvent::Updated(key.clone()));
        Some(prior)
    }

    /// Puts a previously captured data snapshot back. Returns `false` when
    /// the entry no longer exists.
    pub fn restore_data(&mut self, key: &RequestKey, snapshot: Arc<Value>) -> bool {
        let revision = self.bump_revision();
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        entry.data = Some(snapshot);
        entry.data_revision = revision;
        self.pending.push(CacheEvent::Updated(key.clone()));
        true
    }

    pub fn remove(&mut self, key: &RequestKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.tags.unregister(key);
        self.pending.push(CacheEvent::Removed(key.clone()));
        Some(entry)
    }

    /// Keys of all entries providing any of `tags`.
    #[must_use]
    pub fn resolve_tags<'a>(&self, tags: impl IntoIterator<Item = &'a Tag>) -> HashSet<RequestKey> {
        self.tags.resolve(tags)
    }

    #[must_use]
    pub const fn tag_index(&self) -> &TagIndex {
        &self.tags
    }

    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry, returning them so the caller can release
    /// per-entry resources (eviction timers).
    pub fn clear(&mut self) -> Vec<CacheEntry> {
        self.tags.clear();
        let drained: Vec<CacheEntry> = self.entries.drain().map(|(_, entry)| entry).collect();
        self.pending
            .extend(drained.iter().map(|entry| CacheEvent::Removed(entry.key.clone())));
        drained
    }

    /// Drains notifications queued by writes since the last call.
    pub fn take_events(&mut self) -> Vec<CacheEvent> {
        std::mem::take(&mut self.pending)
    }

    fn bump_revision(&mut self) -> u64 {
        self.next_revision += 1;
        self.next_revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn key(name: &str) -> RequestKey {
        RequestKey::new(name, &Value::Null)
    }

    fn entry_with(name: &str, data: Value, tags: &[&str]) -> CacheEntry {
        let mut entry = CacheEntry::new(key(name));
        entry.settle_success(data);
        entry.tags = tags.iter().map(|tag| Tag::new(tag)).collect();
        entry
    }

    #[test]
    fn test_put_and_get() {
        let mut store = CacheStore::new();
        assert!(store.get(&key("getDogs")).is_none());

        store.put(entry_with("getDogs", json!({"1": {}}), &["Dog"]));
        let entry = store.get(&key("getDogs")).expect("entry should exist");
        assert_eq!(entry.data(), Some(&json!({"1": {}})));
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.resolve_tags(&BTreeSet::from([Tag::new("Dog")])),
            HashSet::from([key("getDogs")])
        );
    }

    #[test]
    fn test_put_is_last_write_wins() {
        let mut store = CacheStore::new();
        store.put(entry_with("getDogs", json!(1), &["Dog"]));
        store.put(entry_with("getDogs", json!(2), &["Owner"]));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key("getDogs")).and_then(CacheEntry::data), Some(&json!(2)));
        assert!(store.resolve_tags(&BTreeSet::from([Tag::new("Dog")])).is_empty());
    }

    #[test]
    fn test_revision_tracks_data_identity() {
        let mut store = CacheStore::new();
        store.put(entry_with("getDogs", json!(1), &[]));
        let first = store.get(&key("getDogs")).map(|e| e.data_revision);

        // Status-only change keeps the revision
        store.update(&key("getDogs"), |entry| entry.subscriber_count += 1);
        assert_eq!(store.get(&key("getDogs")).map(|e| e.data_revision), first);

        store.update(&key("getDogs"), |entry| entry.settle_success(json!(2)));
        assert_ne!(store.get(&key("getDogs")).map(|e| e.data_revision), first);
    }

    #[test]
    fn test_patch_returns_prior_snapshot() {
        let mut store = CacheStore::new();
        store.put(entry_with("getDogs", json!({"1": "a", "5": "b"}), &[]));

        let prior = store
            .patch(&key("getDogs"), |data| {
                if let Some(map) = data.as_object_mut() {
                    map.remove("5");
                }
            })
            .expect("entry has data");
        assert_eq!(*prior, json!({"1": "a", "5": "b"}));
        assert_eq!(store.get(&key("getDogs")).and_then(CacheEntry::data), Some(&json!({"1": "a"})));

        assert!(store.restore_data(&key("getDogs"), prior));
        assert_eq!(
            store.get(&key("getDogs")).and_then(CacheEntry::data),
            Some(&json!({"1": "a", "5": "b"}))
        );
    }

    #[test]
    fn test_patch_without_data_is_noop() {
        let mut store = CacheStore::new();
        assert!(store.patch(&key("getDogs"), |_| {}).is_none());

        store.upsert(&key("getDogs"), |_| ());
        assert!(store.patch(&key("getDogs"), |data| *data = json!(1)).is_none());
        assert_eq!(store.get(&key("getDogs")).and_then(CacheEntry::data), None);
    }

    #[test]
    fn test_noop_patch_keeps_revision_counter() {
        let mut store = CacheStore::new();
        store.upsert(&key("getDogs"), |_| ());
        let before = store.get(&key("getDogs")).map(|e| e.data_revision);
        assert!(store.patch(&key("getDogs"), |_| {}).is_none());
        assert!(store.patch(&key("missing"), |_| {}).is_none());

        store.put(entry_with("getServices", json!([]), &[]));
        let after = store.get(&key("getServices")).map(|e| e.data_revision);
        assert_eq!(after, before.map(|revision| revision + 1));
    }

    #[test]
    fn test_remove_unregisters_tags_and_queues_events() {
        let mut store = CacheStore::new();
        store.put(entry_with("getDogs", json!(1), &["Dog"]));
        assert!(store.remove(&key("getDogs")).is_some());
        assert!(store.remove(&key("getDogs")).is_none());
        assert_eq!(store.tag_index().tag_count(), 0);

        assert_eq!(
            store.take_events(),
            vec![
                CacheEvent::Updated(key("getDogs")),
                CacheEvent::Removed(key("getDogs")),
            ]
        );
        assert!(store.take_events().is_empty());
    }

    #[test]
    fn test_clear_drains_entries() {
        let mut store = CacheStore::new();
        store.put(entry_with("a", json!(1), &["Dog"]));
        store.put(entry_with("b", json!(2), &["Dog"]));
        let _ = store.take_events();

        let drained = store.clear();
        assert_eq!(drained.len(), 2);
        assert!(store.is_empty());
        assert_eq!(store.tag_index().tag_count(), 0);
        assert_eq!(store.take_events().len(), 2);
    }
}
