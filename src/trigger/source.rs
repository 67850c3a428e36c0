//! In-process refetch event source.
//!
//! [`TriggerSource`] lets the host (or a test) emit [`RefetchEvent`]s on
//! demand and hands out streams that [`QueryClient::listen`] consumes.
//!
//! ```
//! use kennel::trigger::{RefetchEvent, TriggerSource};
//!
//! let source = TriggerSource::new();
//! // Nobody is listening yet
//! assert_eq!(source.focus(), 0);
//!
//! let _events = source.events();
//! assert_eq!(source.listener_count(), 1);
//! assert_eq!(source.emit(RefetchEvent::Reconnect), 1);
//! ```
//!
//! [`QueryClient::listen`]: crate::client::QueryClient::listen

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use super::RefetchEvent;

/// Emits refetch events to every stream obtained from [`events`](Self::events).
///
/// Clones share the same channel.
#[derive(Debug, Clone)]
pub struct TriggerSource {
    sender: broadcast::Sender<RefetchEvent>,
}

impl TriggerSource {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Creates a source with default capacity (16).
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(16)
    }

    /// Emits `event`. Returns how many streams received it (zero when nobody
    /// is listening).
    pub fn emit(&self, event: RefetchEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn focus(&self) -> usize {
        self.emit(RefetchEvent::Focus)
    }

    pub fn reconnect(&self) -> usize {
        self.emit(RefetchEvent::Reconnect)
    }

    /// A stream of every event emitted from now on.
    #[must_use]
    pub fn events(&self) -> BoxStream<'static, RefetchEvent> {
        BroadcastStream::new(self.sender.subscribe())
            .filter_map(|result| async move { result.ok() })
            .boxed()
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for TriggerSource {
    fn default() -> Self {
        Self::new()
    }
}
