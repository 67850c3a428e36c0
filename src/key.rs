//! Request keys and invalidation tags.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Deterministic identity of a query call.
///
/// Rendered as `endpoint(args)` where `args` is the compact JSON form of the
/// arguments. `serde_json` keeps object keys sorted, so structurally equal
/// arguments always produce the same key.
///
/// ```
/// use kennel::key::RequestKey;
/// use serde_json::json;
///
/// let a = RequestKey::new("getService", &json!({"id": "a1", "full": true}));
/// let b = RequestKey::new("getService", &json!({"full": true, "id": "a1"}));
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), r#"getService({"full":true,"id":"a1"})"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey(Arc<str>);

impl RequestKey {
    #[must_use]
    pub fn new(endpoint: &str, args: &Value) -> Self {
        Self(Arc::from(format!("{endpoint}({args})")))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque invalidation label.
///
/// Queries declare the tags they provide; mutations declare the tags they
/// invalidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(Arc<str>);

impl Tag {
    #[must_use]
    pub fn new(label: &str) -> Self {
        Self(Arc::from(label))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Tag {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl From<String> for Tag {
    fn from(label: String) -> Self {
        Self(Arc::from(label))
    }
}

impl Borrow<str> for Tag {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_without_args() {
        let key = RequestKey::new("getDogs", &Value::Null);
        assert_eq!(key.as_str(), "getDogs(null)");
        assert_eq!(key.to_string(), "getDogs(null)");
    }

    #[test]
    fn test_key_distinguishes_endpoints_and_args() {
        let dogs = RequestKey::new("getDogs", &Value::Null);
        let services = RequestKey::new("getServices", &Value::Null);
        assert_ne!(dogs, services);

        let one = RequestKey::new("getService", &json!("a1"));
        let two = RequestKey::new("getService", &json!("b2"));
        assert_ne!(one, two);
    }

    #[test]
    fn test_key_nested_objects_are_order_independent() {
        let a = RequestKey::new("search", &json!({"filter": {"size": "small", "age": 3}}));
        let b = RequestKey::new("search", &json!({"filter": {"age": 3, "size": "small"}}));
        assert_eq!(a, b);
    }

    #[test]
    fn test_tag_conversions() {
        let tag: Tag = "Dog".into();
        assert_eq!(tag.as_str(), "Dog");
        assert_eq!(tag, Tag::from("Dog".to_string()));
        assert_eq!(tag.to_string(), "Dog");
    }
}
