use std::time::Duration;

use crate::transport::HeaderSet;

/// Configuration for a [`QueryClient`](crate::client::QueryClient).
///
/// Per-query settings (tags, transforms, idle window overrides) live on the
/// endpoint definitions; this holds the process-wide defaults.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long an entry with no subscribers is kept before eviction.
    ///
    /// Zero evicts as soon as the last subscriber leaves. Queries may override
    /// this with [`QueryDefinition::keep_unused_for`](crate::endpoint::QueryDefinition::keep_unused_for).
    pub keep_unused_for: Duration,

    /// Refetch subscribed entries when the host reports regained focus.
    pub refetch_on_focus: bool,

    /// Refetch subscribed entries when the host reports restored connectivity.
    pub refetch_on_reconnect: bool,

    /// Headers sent with every request. Request-specific headers win on conflict.
    pub default_headers: HeaderSet,

    /// When set, every request carries a fresh UUID v4 under this header name.
    pub request_id_header: Option<String>,

    /// Capacity of the cache change broadcast channel.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            keep_unused_for: Duration::ZERO, // evict immediately
            refetch_on_focus: true,
            refetch_on_reconnect: true,
            default_headers: HeaderSet::new(),
            request_id_header: None,
            event_capacity: 100,
        }
    }
}

impl ClientConfig {
    /// Creates a configuration with the given idle eviction window.
    #[must_use]
    pub fn new(keep_unused_for: Duration) -> Self {
        Self {
            keep_unused_for,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_refetch_on_focus(mut self, enabled: bool) -> Self {
        self.refetch_on_focus = enabled;
        self
    }

    #[must_use]
    pub const fn with_refetch_on_reconnect(mut self, enabled: bool) -> Self {
        self.refetch_on_reconnect = enabled;
        self
    }

    #[must_use]
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_request_id_header(mut self, name: impl Into<String>) -> Self {
        self.request_id_header = Some(name.into());
        self
    }
}
