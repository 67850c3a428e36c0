//! Refetch triggers.
//!
//! The host application reports focus and connectivity changes as
//! [`RefetchEvent`]s. Each event refetches every entry that currently has
//! subscribers, if the client is configured to react to that event. One
//! entry failing does not stop the rest of the sweep.
//!
//! Events can be delivered directly with [`QueryClient::refetch_subscribed`],
//! or as a stream with [`QueryClient::listen`], which spawns a task that runs
//! until cancelled or until the client is disposed.

pub mod source;

pub use source::TriggerSource;

use futures::StreamExt;
use futures::future::join_all;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{FetchMode, QueryClient};
use crate::key::RequestKey;

/// A host environment change that may make cached data outdated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefetchEvent {
    /// The application regained focus.
    Focus,
    /// Network connectivity was restored.
    Reconnect,
}

/// Outcome of a refetch sweep. Both lists are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub refetched: Vec<RequestKey>,
    pub failed: Vec<RequestKey>,
}

impl SweepReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.refetched.is_empty() && self.failed.is_empty()
    }
}

/// Handle for a running [`QueryClient::listen`] task.
#[derive(Debug)]
pub struct ListenerHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl ListenerHandle {
    /// Stops listening and waits for the task to finish.
    pub async fn cancel(self) {
        self.token.cancel();
        let _ = self.join.await;
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl QueryClient {
    /// Whether this client reacts to `event`.
    #[must_use]
    pub fn refetches_on(&self, event: RefetchEvent) -> bool {
        match event {
            RefetchEvent::Focus => self.config().refetch_on_focus,
            RefetchEvent::Reconnect => self.config().refetch_on_reconnect,
        }
    }

    /// Refetches every subscribed entry in response to `event`.
    ///
    /// Returns an empty report when the client ignores `event` or has been
    /// disposed.
    pub async fn refetch_subscribed(&self, event: RefetchEvent) -> SweepReport {
        if !self.refetches_on(event) || self.is_disposed() {
            debug!(?event, "refetch event ignored");
            return SweepReport::default();
        }

        let mut targets = self.with_state("refetch_subscribed", |state| {
            state
                .store
                .entries()
                .filter(|entry| entry.subscriber_count > 0)
                .filter_map(|entry| entry.origin.clone().map(|origin| (entry.key.clone(), origin)))
                .collect::<Vec<_>>()
        });
        targets.sort_by(|a, b| a.0.cmp(&b.0));

        let settled = join_all(
            targets
                .iter()
                .map(|(_, origin)| self.fetch(&origin.definition, origin.args.clone(), FetchMode::Force)),
        )
        .await;

        let mut report = SweepReport::default();
        for ((key, _), entry) in targets.into_iter().zip(settled) {
            match &entry.error {
                Some(err) if entry.is_error() => {
                    warn!(key = %key, error = %err, "refetch failed");
                    report.failed.push(key);
                }
                _ => report.refetched.push(key),
            }
        }
        info!(
            ?event,
            refetched = report.refetched.len(),
            failed = report.failed.len(),
            "refetch sweep finished"
        );
        report
    }

    /// Runs a refetch sweep for every event from `events`.
    ///
    /// The returned handle stops the listener; disposing the client stops it
    /// too.
    #[must_use = "dropping the handle leaves the listener running"]
    pub fn listen<S>(&self, events: S) -> ListenerHandle
    where
        S: Stream<Item = RefetchEvent> + Send + 'static,
    {
        let token = self.inner.shutdown.child_token();
        let client = self.clone();
        let cancel = token.clone();
        let join = tokio::spawn(async move {
            let mut events = std::pin::pin!(events);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    next = events.next() => match next {
                        Some(event) => {
                            client.refetch_subscribed(event).await;
                        }
                        None => break,
                    },
                }
            }
            debug!("refetch listener stopped");
        });
        ListenerHandle { token, join }
    }
}
