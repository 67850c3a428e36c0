//! Declarative endpoint descriptors.
//!
//! An endpoint is plain data: a name plus named `fn` pointers that build the
//! request, post-process the response, and compute tags. Nothing here holds
//! state; the [`Api`](crate::api::Api) builder validates a table of these once
//! at setup time.

use std::time::Duration;

use serde_json::Value;

use crate::error::{QueryError, TransformError};
use crate::key::Tag;
use crate::transport::{HeaderSet, Method, Response};

/// Builds the request for a call from its arguments.
pub type RequestFn = fn(&Value) -> RequestSpec;

/// Pure post-processing applied to a successful response body before caching.
pub type TransformFn = fn(Value) -> Result<Value, TransformError>;

/// Computes tags from `(result, args)`.
pub type TagsFn = fn(&Value, &Value) -> Vec<Tag>;

/// Edits cached data in place, given the mutation's arguments.
pub type RecipeFn = fn(&mut Value, &Value);

/// Maps a mutation's arguments to the arguments of the query it patches.
pub type TargetArgsFn = fn(&Value) -> Value;

/// Endpoint-relative description of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub headers: HeaderSet,
    pub body: Option<Value>,
}

impl RequestSpec {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderSet::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Tags declared by a query (`provides`) or a mutation (`invalidates`).
#[derive(Debug, Clone, Default)]
pub enum TagSpec {
    #[default]
    None,
    Static(Vec<Tag>),
    /// Computed from the successful result and the call arguments.
    Computed(TagsFn),
}

impl TagSpec {
    /// Shorthand for a static tag list.
    #[must_use]
    pub fn list(tags: &[&str]) -> Self {
        Self::Static(tags.iter().map(|tag| Tag::new(tag)).collect())
    }

    /// Resolves the tags for a settled call. `result` is `None` when the call
    /// failed, in which case only static tags apply.
    #[must_use]
    pub fn resolve(&self, result: Option<&Value>, args: &Value) -> Vec<Tag> {
        match (self, result) {
            (Self::None, _) | (Self::Computed(_), None) => Vec::new(),
            (Self::Static(tags), _) => tags.clone(),
            (Self::Computed(f), Some(result)) => f(result, args),
        }
    }
}

/// A cached read endpoint.
#[derive(Debug, Clone)]
pub struct QueryDefinition {
    pub name: &'static str,
    pub request: RequestFn,
    pub transform: Option<TransformFn>,
    pub provides: TagSpec,
    /// Idle eviction window; falls back to the client default when `None`.
    pub keep_unused_for: Option<Duration>,
}

impl QueryDefinition {
    #[must_use]
    pub fn new(name: &'static str, request: RequestFn) -> Self {
        Self {
            name,
            request,
            transform: None,
            provides: TagSpec::None,
            keep_unused_for: None,
        }
    }

    #[must_use]
    pub fn transform(mut self, transform: TransformFn) -> Self {
        self.transform = Some(transform);
        self
    }

    #[must_use]
    pub fn provides(mut self, tags: TagSpec) -> Self {
        self.provides = tags;
        self
    }

    #[must_use]
    pub const fn keep_unused_for(mut self, window: Duration) -> Self {
        self.keep_unused_for = Some(window);
        self
    }

    /// Turns a transport response into the value to cache.
    pub fn decode(&self, response: Response) -> Result<Value, QueryError> {
        let body = response.into_result()?;
        match self.transform {
            Some(transform) => transform(body).map_err(QueryError::from),
            None => Ok(body),
        }
    }
}

/// A speculative edit a mutation applies to one cached query before its
/// network call settles.
#[derive(Debug, Clone)]
pub struct OptimisticUpdate {
    /// Name of the query endpoint whose cached data is patched.
    pub target: &'static str,
    pub target_args: TargetArgsFn,
    pub recipe: RecipeFn,
}

/// Target args for queries that take no arguments.
#[must_use]
pub fn no_args(_: &Value) -> Value {
    Value::Null
}

/// A write endpoint. Mutations are never cached.
#[derive(Debug, Clone)]
pub struct MutationDefinition {
    pub name: &'static str,
    pub request: RequestFn,
    pub invalidates: TagSpec,
    pub optimistic: Vec<OptimisticUpdate>,
}

impl MutationDefinition {
    #[must_use]
    pub fn new(name: &'static str, request: RequestFn) -> Self {
        Self {
            name,
            request,
            invalidates: TagSpec::None,
            optimistic: Vec::new(),
        }
    }

    #[must_use]
    pub fn invalidates(mut self, tags: TagSpec) -> Self {
        self.invalidates = tags;
        self
    }

    #[must_use]
    pub fn optimistic(mut self, update: OptimisticUpdate) -> Self {
        self.optimistic.push(update);
        self
    }
}
