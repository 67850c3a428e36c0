//! Cache storage: entries, the store that owns them, and the tag index.

pub mod entry;
pub mod store;
pub mod tags;

pub use entry::{CacheEntry, QueryStatus};
pub use store::{CacheEvent, CacheStore};
pub use tags::TagIndex;
