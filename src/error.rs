//! Error types for queries, mutations, and endpoint setup.

use serde_json::Value;
use thiserror::Error;

/// Error stored on a cache entry or mutation result.
///
/// These are never returned as `Err` from the consumer interface. A failed
/// fetch settles its entry with [`QueryStatus::Error`](crate::cache::QueryStatus)
/// and keeps the error alongside it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request failed with status {status}")]
    Response { status: u16, body: Value },

    #[error("Transform failed: {0}")]
    Transform(String),

    #[error("Query client has been disposed")]
    Disposed,
}

/// Error returned by a response transform function.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransformError(pub String);

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<TransformError> for QueryError {
    fn from(err: TransformError) -> Self {
        Self::Transform(err.0)
    }
}

/// Fatal endpoint configuration error, reported once at setup time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Endpoint definition is missing a name")]
    MissingName,

    #[error("Endpoint `{0}` is defined more than once")]
    DuplicateEndpoint(String),

    #[error("Unknown endpoint `{0}`")]
    UnknownEndpoint(String),

    #[error("Endpoint `{name}` is not a {expected}")]
    WrongKind { name: String, expected: &'static str },

    #[error("Mutation `{mutation}` patches unknown query `{target}`")]
    UnknownOptimisticTarget { mutation: String, target: String },
}
