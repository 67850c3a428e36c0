//! The network collaborator the cache calls out to.
//!
//! The cache never builds URLs. Endpoint definitions produce a path, a method,
//! headers and an optional JSON body; a [`Transport`] turns that into a
//! response or a [`QueryError::Network`].

pub mod http;
pub mod mock;

use std::collections::BTreeMap;
use std::fmt;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::QueryError;

pub use http::HttpTransport;
pub use mock::{MockReply, MockTransport};

/// Header name → value, merged from process-wide defaults and per-request values.
pub type HeaderSet = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully prepared request handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub headers: HeaderSet,
    pub body: Option<Value>,
}

/// A transport-level response. Any status is a response; the cache decides
/// what counts as success.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    #[must_use]
    pub const fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    #[must_use]
    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Converts a non-2xx response into [`QueryError::Response`].
    pub fn into_result(self) -> Result<Value, QueryError> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(QueryError::Response {
                status: self.status,
                body: self.body,
            })
        }
    }
}

/// Sends requests on behalf of the cache.
///
/// Implementations report connection-level failures as
/// [`QueryError::Network`]. Non-success statuses are returned as ordinary
/// [`Response`]s.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, request: Request) -> BoxFuture<'static, Result<Response, QueryError>>;
}
