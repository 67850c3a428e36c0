//! Bidirectional tag index.
//!
//! Tracks tag → keys and key → tags so that invalidation can fan out from a
//! tag and a key's membership can be replaced or dropped without scanning.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::key::{RequestKey, Tag};

#[derive(Debug, Default)]
pub struct TagIndex {
    tag_to_keys: HashMap<Tag, HashSet<RequestKey>>,
    key_to_tags: HashMap<RequestKey, BTreeSet<Tag>>,
}

impl TagIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces `key`'s tag membership with `tags`.
    ///
    /// Registering the same key again is an idempotent replace, not a merge.
    pub fn register(&mut self, key: &RequestKey, tags: &BTreeSet<Tag>) {
        self.unregister(key);
        if tags.is_empty() {
            return;
        }
        for tag in tags {
            self.tag_to_keys
                .entry(tag.clone())
                .or_default()
                .insert(key.clone());
        }
        self.key_to_tags.insert(key.clone(), tags.clone());
    }

    /// Removes `key` from every tag it was registered under.
    pub fn unregister(&mut self, key: &RequestKey) {
        let Some(tags) = self.key_to_tags.remove(key) else {
            return;
        };
        for tag in tags {
            if let Some(keys) = self.tag_to_keys.get_mut(&tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tag_to_keys.remove(&tag);
                }
            }
        }
    }

    /// All keys currently associated with any of `tags`.
    #[must_use]
    pub fn resolve<'a>(&self, tags: impl IntoIterator<Item = &'a Tag>) -> HashSet<RequestKey> {
        tags.into_iter()
            .filter_map(|tag| self.tag_to_keys.get(tag))
            .flatten()
            .cloned()
            .collect()
    }

    /// Tags currently registered for `key`.
    #[must_use]
    pub fn tags_for(&self, key: &RequestKey) -> Option<&BTreeSet<Tag>> {
        self.key_to_tags.get(key)
    }

    pub fn clear(&mut self) {
        self.tag_to_keys.clear();
        self.key_to_tags.clear();
    }

    /// Number of distinct tags with at least one key.
    #[must_use]
    pub fn tag_count(&self) -> usize {
        self.tag_to_keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn key(name: &str) -> RequestKey {
        RequestKey::new(name, &Value::Null)
    }

    fn tags(labels: &[&str]) -> BTreeSet<Tag> {
        labels.iter().map(|label| Tag::new(label)).collect()
    }

    #[test]
    fn test_register_and_resolve() {
        let mut index = TagIndex::new();
        index.register(&key("getDogs"), &tags(&["Dog"]));
        index.register(&key("getServices"), &tags(&["Service"]));
        index.register(&key("getDashboard"), &tags(&["Dog", "Service"]));

        let dog_keys = index.resolve(&tags(&["Dog"]));
        assert_eq!(dog_keys.len(), 2);
        assert!(dog_keys.contains(&key("getDogs")));
        assert!(dog_keys.contains(&key("getDashboard")));

        let all = index.resolve(&tags(&["Dog", "Service"]));
        assert_eq!(all.len(), 3);

        assert!(index.resolve(&tags(&["Cat"])).is_empty());
    }

    #[test]
    fn test_register_replaces_previous_membership() {
        let mut index = TagIndex::new();
        let dogs = key("getDogs");
        index.register(&dogs, &tags(&["Dog", "Owner"]));
        index.register(&dogs, &tags(&["Dog", "Owner"]));
        assert_eq!(index.tag_count(), 2);

        index.register(&dogs, &tags(&["Dog"]));
        assert!(index.resolve(&tags(&["Owner"])).is_empty());
        assert_eq!(index.tag_count(), 1);
        assert_eq!(index.tags_for(&dogs), Some(&tags(&["Dog"])));

        index.register(&dogs, &BTreeSet::new());
        assert!(index.resolve(&tags(&["Dog"])).is_empty());
        assert_eq!(index.tags_for(&dogs), None);
    }

    #[test]
    fn test_unregister_cleans_up_empty_tags() {
        let mut index = TagIndex::new();
        index.register(&key("a"), &tags(&["Dog"]));
        index.register(&key("b"), &tags(&["Dog"]));

        index.unregister(&key("a"));
        assert_eq!(index.resolve(&tags(&["Dog"])), HashSet::from([key("b")]));

        index.unregister(&key("b"));
        assert_eq!(index.tag_count(), 0);

        // Unknown keys are a no-op
        index.unregister(&key("c"));
    }
}
