//! # Kennel - Query and Mutation Cache
//!
//! Kennel sits between a UI and its HTTP API. It caches responses keyed by
//! endpoint and arguments, deduplicates in-flight requests, refreshes cached
//! data through a tag graph when mutations succeed, applies optimistic edits
//! with exact rollback, evicts entries nobody has used for a while, and
//! memoizes derived values.
//!
//! ## Architecture
//!
//! 1. **Endpoints**: declarative descriptions of queries and mutations
//! 2. **Cache store**: entries keyed by [`RequestKey`](key::RequestKey), plus a tag index
//! 3. **Client**: fetch coordinator, the only writer to the store
//! 4. **Subscriptions**: reference counts that keep entries alive
//! 5. **Selectors**: derived values recomputed only when their inputs change
//! 6. **Triggers**: focus and reconnect events that refetch subscribed entries
//!
//! ## Core Components
//!
//! - [`QueryClient`](client::QueryClient): owns the cache and runs every operation
//! - [`Api`](api::Api): a validated endpoint table
//! - [`Subscription`](subscription::Subscription): a live interest in one entry
//! - [`Selector`](selector::Selector): a memoized derived value
//! - [`Transport`](transport::Transport): how requests reach the network
//!
//! ## Example
//!
//! ```
//! use kennel::prelude::*;
//! use serde_json::{Value, json};
//!
//! fn services(_: &Value) -> RequestSpec {
//!     RequestSpec::get("/services")
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ConfigError> {
//! let api = Api::builder()
//!     .query(QueryDefinition::new("getServices", services).provides(TagSpec::list(&["Service"])))
//!     .build()?;
//! let get_services = api.query::<()>("getServices")?;
//!
//! let transport = MockTransport::new();
//! transport.on(Method::Get, "/services", MockReply::Json(json!(["walk", "groom"])));
//! let client = QueryClient::new(transport.clone(), ClientConfig::default());
//!
//! let sub = client.subscribe(&get_services, ());
//! let entry = sub.ready().await;
//! assert_eq!(entry.data(), Some(&json!(["walk", "groom"])));
//!
//! // Refetches every subscribed entry providing the tag
//! let refetched = client.invalidate_tags(["Service"]).await;
//! assert_eq!(refetched, vec![get_services.key(())]);
//! assert_eq!(transport.calls(Method::Get, "/services"), 2);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod boarding;
pub mod cache;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod key;
mod lock;
pub mod mutation;
pub mod optimistic;
pub mod prelude;
pub mod selector;
pub mod subscription;
pub mod transport;
pub mod trigger;
