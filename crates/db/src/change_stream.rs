//! In-process change stream for poll mutations.
//!
//! Every committed poll mutation (insert, update, status change, vote) is
//! published here by the repository, after the write, as the full re-read
//! document. The change feed consumes this and turns vote appends into live
//! SSE updates. The append always happens-before the publish.

use tokio::sync::broadcast;

use crate::entities::poll;

/// Name of the poll collection, carried on every change record.
pub const POLLS_COLLECTION: &str = "polls";

/// A committed mutation observed on the polls collection.
#[derive(Debug, Clone)]
pub struct PollChange {
    /// Collection the change belongs to.
    pub collection: String,
    /// The full document after the mutation.
    pub full_document: poll::Model,
}

/// Broadcast fan-in point for poll mutations.
///
/// Cheap to clone; the repository holds one end and publishes, the change
/// feed subscribes. Slow subscribers lag (and observe
/// [`broadcast::error::RecvError::Lagged`]) rather than block writers.
#[derive(Debug, Clone)]
pub struct PollChangeStream {
    tx: broadcast::Sender<PollChange>,
}

impl PollChangeStream {
    /// Create a change stream with the given buffered capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to committed poll mutations.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PollChange> {
        self.tx.subscribe()
    }

    /// Publish a committed mutation. A send with no subscribers is a no-op.
    pub fn publish(&self, document: poll::Model) {
        let _ = self.tx.send(PollChange {
            collection: POLLS_COLLECTION.to_string(),
            full_document: document,
        });
    }
}

impl Default for PollChangeStream {
    fn default() -> Self {
        Self::new(1024)
    }
}
