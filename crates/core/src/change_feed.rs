//! Change feed: turns committed poll mutations into hub updates.
//!
//! A long-running task started at bootstrap. It consumes the storage change
//! stream and forwards every poll document to the hub as a `poll_updated`
//! event; this is how vote appends reach SSE subscribers.

use std::sync::Arc;

use livepoll_db::change_stream::{POLLS_COLLECTION, PollChange, PollChangeStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::hub::SseHub;

/// Consume a change-stream subscription until it closes. Lag is logged and
/// skipped — the receiver stays subscribed and picks up from the newest
/// retained record.
pub async fn run(mut rx: broadcast::Receiver<PollChange>, hub: Arc<SseHub>) {
    info!("Change feed started");

    loop {
        match rx.recv().await {
            Ok(change) => {
                if change.collection != POLLS_COLLECTION {
                    debug!(collection = %change.collection, "Ignoring change for other collection");
                    continue;
                }
                hub.emit_update(&change.full_document).await;
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Change feed lagged, skipping records");
            }
            Err(RecvError::Closed) => {
                info!("Change stream closed, stopping feed");
                break;
            }
        }
    }
}

/// Spawn the feed as a background task. The subscription is taken before
/// this returns, so no change published afterwards is missed.
pub fn spawn(changes: &PollChangeStream, hub: Arc<SseHub>) -> tokio::task::JoinHandle<()> {
    let rx = changes.subscribe();
    tokio::spawn(run(rx, hub))
}
