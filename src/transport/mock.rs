//! In-memory transport for development and testing.
//!
//! [`MockTransport`] answers requests from a route table keyed by method and
//! path, records every request it receives, and can hold responses back until
//! released, so tests can observe in-flight behaviour deterministically.
//!
//! ```
//! use kennel::transport::{Method, MockReply, MockTransport};
//! use serde_json::json;
//!
//! let transport = MockTransport::new();
//! transport.on(Method::Get, "/dogs", MockReply::Json(json!({"1": {"weight": 12}})));
//! transport.on(Method::Delete, "/dogs/1", MockReply::Status(500, json!("boom")));
//! assert_eq!(transport.calls(Method::Get, "/dogs"), 0);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::watch;

use crate::error::QueryError;
use crate::lock::mutex_lock;

use super::{Method, Request, Response, Transport};

/// How the mock answers a route.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// Respond with status 200 and the given body.
    Json(Value),
    /// Respond with the given status and body.
    Status(u16, Value),
    /// Fail at the network level.
    Fail(String),
}

#[derive(Debug)]
struct MockInner {
    routes: Mutex<HashMap<(Method, String), MockReply>>,
    log: Mutex<Vec<Request>>,
    gate: watch::Sender<bool>,
}

/// A cloneable, scriptable transport.
///
/// Clones share routes, the request log, and the hold gate. Unknown routes
/// answer `404`.
#[derive(Debug, Clone)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            inner: Arc::new(MockInner {
                routes: Mutex::new(HashMap::new()),
                log: Mutex::new(Vec::new()),
                gate,
            }),
        }
    }

    /// Sets (or replaces) the reply for `method path`.
    ///
    /// Replies are looked up when a request resolves, so changing a route
    /// while requests are held affects those requests too.
    pub fn on(&self, method: Method, path: &str, reply: MockReply) -> &Self {
        mutex_lock(&self.inner.routes, "transport::mock", "on")
            .insert((method, path.to_string()), reply);
        self
    }

    /// Holds every request until [`release`](Self::release) is called.
    pub fn hold(&self) {
        self.inner.gate.send_replace(false);
    }

    /// Lets held and future requests resolve.
    pub fn release(&self) {
        self.inner.gate.send_replace(true);
    }

    /// Number of requests received for `method path`, including held ones.
    #[must_use]
    pub fn calls(&self, method: Method, path: &str) -> usize {
        mutex_lock(&self.inner.log, "transport::mock", "calls")
            .iter()
            .filter(|request| request.method == method && request.path == path)
            .count()
    }

    /// Every request received so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<Request> {
        mutex_lock(&self.inner.log, "transport::mock", "requests").clone()
    }

    fn reply_for(&self, method: Method, path: &str) -> MockReply {
        mutex_lock(&self.inner.routes, "transport::mock", "reply_for")
            .get(&(method, path.to_string()))
            .cloned()
            .unwrap_or_else(|| MockReply::Status(404, Value::Null))
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn send(&self, request: Request) -> BoxFuture<'static, Result<Response, QueryError>> {
        let method = request.method;
        let path = request.path.clone();
        mutex_lock(&self.inner.log, "transport::mock", "send").push(request);

        let mock = self.clone();
        let mut gate = self.inner.gate.subscribe();
        async move {
            // The sender lives in `mock`, so the gate cannot close while we wait.
            let _ = gate.wait_for(|open| *open).await;
            match mock.reply_for(method, &path) {
                MockReply::Json(body) => Ok(Response::ok(body)),
                MockReply::Status(status, body) => Ok(Response::new(status, body)),
                MockReply::Fail(message) => Err(QueryError::Network(message)),
            }
        }
        .boxed()
    }
}
