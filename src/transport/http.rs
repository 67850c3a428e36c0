//! HTTP transport backed by reqwest.
//!
//! Prefixes request paths with a base URL and exchanges JSON bodies.

use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::Client;
use serde_json::Value;

use crate::error::QueryError;

use super::{Method, Request, Response, Transport};

/// Sends requests to `base_url + path` using a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for the given base URL (e.g. `https://example.com/api`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, QueryError> {
        let client = Client::builder()
            .build()
            .map_err(|e| QueryError::Network(e.to_string()))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create a transport around an already configured client.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// The absolute URL for a request path.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

/// Parse a response body as JSON, falling back to a string for non-JSON payloads.
fn decode_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

impl Transport for HttpTransport {
    fn send(&self, request: Request) -> BoxFuture<'static, Result<Response, QueryError>> {
        let mut builder = self
            .client
            .request(reqwest_method(request.method), self.url(&request.path));
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        async move {
            let response = builder
                .send()
                .await
                .map_err(|e| QueryError::Network(e.to_string()))?;
            let status = response.status().as_u16();
            let bytes = response
                .bytes()
                .await
                .map_err(|e| QueryError::Network(e.to_string()))?;
            Ok(Response::new(status, decode_body(&bytes)))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_joining() {
        let transport = HttpTransport::with_client(Client::new(), "https://example.com/api/");
        assert_eq!(transport.url("/dogs"), "https://example.com/api/dogs");
        assert_eq!(transport.url("contact"), "https://example.com/api/contact");
    }

    #[test]
    fn test_decode_body() {
        assert_eq!(decode_body(b""), Value::Null);
        assert_eq!(decode_body(br#"{"1":{"name":"Rex"}}"#), json!({"1": {"name": "Rex"}}));
        assert_eq!(decode_body(b"Created"), json!("Created"));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let transport = HttpTransport::new("http://127.0.0.1:1").expect("client should build");
        let result = transport
            .send(Request {
                method: Method::Get,
                path: "/dogs".to_string(),
                headers: Default::default(),
                body: None,
            })
            .await;
        assert!(matches!(result, Err(QueryError::Network(_))));
    }
}
