//! SSE hub: per-poll subscriber registry and event fan-out.
//!
//! Each subscriber owns the receiving half of a bounded channel; the hub
//! keeps the sending half. All registry access, delivery included, goes
//! through one lock, so a send can never race a close. Delivery is
//! non-blocking: a full sink drops that event for that subscriber, a closed
//! sink (client gone) is pruned on the spot. Because every event for a
//! subscriber funnels through its one queue, each subscriber observes a
//! poll's events in emit order.

use std::collections::HashMap;

use livepoll_db::entities::poll;
use serde::Serialize;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

use crate::model::PollResult;

/// Event type: a poll was started.
pub const EVENT_POLL_STARTED: &str = "poll_started";
/// Event type: a poll was ended.
pub const EVENT_POLL_END: &str = "poll_end";
/// Event type: a poll was deleted.
pub const EVENT_POLL_DELETED: &str = "poll_deleted";
/// Event type: a poll's responses changed.
pub const EVENT_POLL_UPDATED: &str = "poll_updated";

/// One event frame delivered to an SSE subscriber.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollEvent {
    pub poll_id: String,
    pub event_type: String,
    /// Per-viewer tallied results; present on `poll_updated` only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<i64>>,
}

struct Subscriber {
    user_id: String,
    tx: mpsc::Sender<PollEvent>,
}

#[derive(Default)]
struct Registry {
    subscribers: HashMap<String, Vec<Subscriber>>,
    /// Polls whose lifetime ended. Registrations against these get an
    /// immediately-closed sink and no event is ever delivered again.
    closed: std::collections::HashSet<String>,
}

/// Per-poll subscriber registry.
#[derive(Default)]
pub struct SseHub {
    inner: RwLock<Registry>,
}

/// Buffered events per subscriber before deliveries start dropping.
const SINK_CAPACITY: usize = 64;

impl SseHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `user_id` for events on `poll_id`.
    ///
    /// The returned receiver yields events until the poll is closed or the
    /// user is unregistered; both surface as end-of-stream. Registering on
    /// an already-closed poll yields a sink that is closed from the start.
    pub async fn register(&self, user_id: &str, poll_id: &str) -> mpsc::Receiver<PollEvent> {
        let (tx, rx) = mpsc::channel(SINK_CAPACITY);

        let mut registry = self.inner.write().await;
        if registry.closed.contains(poll_id) {
            drop(tx);
            return rx;
        }

        registry
            .subscribers
            .entry(poll_id.to_string())
            .or_default()
            .push(Subscriber {
                user_id: user_id.to_string(),
                tx,
            });
        rx
    }

    /// Drop every subscription `user_id` holds on `poll_id`, closing the
    /// sinks.
    pub async fn unregister(&self, user_id: &str, poll_id: &str) {
        let mut registry = self.inner.write().await;
        if let Some(subs) = registry.subscribers.get_mut(poll_id) {
            subs.retain(|s| s.user_id != user_id);
            if subs.is_empty() {
                registry.subscribers.remove(poll_id);
            }
        }
    }

    /// Close every subscriber of `poll_id` and drop the entry. Subsequent
    /// events for the poll are no-ops.
    pub async fn close_poll(&self, poll_id: &str) {
        let mut registry = self.inner.write().await;
        registry.subscribers.remove(poll_id);
        if registry.closed.insert(poll_id.to_string()) {
            debug!(poll_id, "Closed poll subscriptions");
        }
    }

    /// Send a bare `{poll_id, event_type}` frame to every subscriber.
    pub async fn emit(&self, poll_id: &str, event_type: &str) {
        let event = PollEvent {
            poll_id: poll_id.to_string(),
            event_type: event_type.to_string(),
            result: None,
        };

        let mut registry = self.inner.write().await;
        if let Some(subs) = registry.subscribers.get_mut(poll_id) {
            subs.retain(|sub| deliver(sub, event.clone()));
            if subs.is_empty() {
                registry.subscribers.remove(poll_id);
            }
        }
    }

    /// Send a `poll_updated` frame with per-viewer results to every
    /// subscriber of the poll.
    pub async fn emit_update(&self, model: &poll::Model) {
        let mut registry = self.inner.write().await;
        if let Some(subs) = registry.subscribers.get_mut(&model.id) {
            subs.retain(|sub| {
                let event = PollEvent {
                    poll_id: model.id.clone(),
                    event_type: EVENT_POLL_UPDATED.to_string(),
                    result: Some(PollResult::project(model, &sub.user_id).results),
                };
                deliver(sub, event)
            });
            if subs.is_empty() {
                registry.subscribers.remove(&model.id);
            }
        }
    }

    /// Number of live subscribers for a poll.
    pub async fn subscriber_count(&self, poll_id: &str) -> usize {
        self.inner
            .read()
            .await
            .subscribers
            .get(poll_id)
            .map_or(0, Vec::len)
    }
}

/// Deliver without blocking. Returns `false` when the subscriber is gone and
/// should be pruned.
fn deliver(sub: &Subscriber, event: PollEvent) -> bool {
    match sub.tx.try_send(event) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(event)) => {
            warn!(
                poll_id = %event.poll_id,
                user_id = %sub.user_id,
                "Subscriber sink full, dropping event"
            );
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}
