//! Prelude module for convenient imports.
//!
//! ```
//! use kennel::prelude::*;
//! ```

pub use crate::api::{Api, MutationEndpoint, QueryEndpoint};
pub use crate::boarding::{BoardingApi, DogId};
pub use crate::cache::{CacheEntry, CacheEvent, QueryStatus};
pub use crate::client::QueryClient;
pub use crate::config::ClientConfig;
pub use crate::endpoint::{
    MutationDefinition, OptimisticUpdate, QueryDefinition, RequestSpec, TagSpec, no_args,
};
pub use crate::error::{ConfigError, QueryError, TransformError};
pub use crate::key::{RequestKey, Tag};
pub use crate::mutation::{MutationResult, MutationState};
pub use crate::optimistic::OptimisticPatch;
pub use crate::selector::{LocalState, Selector, SelectorInput};
pub use crate::subscription::Subscription;
pub use crate::transport::{
    HttpTransport, Method, MockReply, MockTransport, Request, Response, Transport,
};
pub use crate::trigger::{ListenerHandle, RefetchEvent, SweepReport, TriggerSource};
