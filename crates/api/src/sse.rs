//! Server-Sent Events stream for live poll updates.
//!
//! `GET /polls/{id}/events` holds the connection open and delivers the
//! poll's lifecycle and update events as JSON frames. The subscription ends
//! when the poll is closed (its sink is dropped by the hub) or the client
//! disconnects; disconnection unregisters the subscriber so the registry
//! does not accumulate dead sinks.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use livepoll_common::{AppError, AppResult, is_valid_id};
use livepoll_core::SseHub;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::{extractors::AuthUser, middleware::AppState};

/// Unregisters the subscriber when the response stream is dropped.
struct SubscriptionGuard {
    hub: Arc<SseHub>,
    user_id: String,
    poll_id: String,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        let hub = Arc::clone(&self.hub);
        let user_id = std::mem::take(&mut self.user_id);
        let poll_id = std::mem::take(&mut self.poll_id);

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                hub.unregister(&user_id, &poll_id).await;
            });
        }
    }
}

/// Subscribe to a poll's event stream.
pub async fn poll_events(
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    if !is_valid_id(&id) {
        return Err(AppError::BadRequest(format!("malformed poll id: {id}")));
    }

    let rx = state.poll_service.subscribe(&identity, &id).await;
    let guard = SubscriptionGuard {
        hub: state.poll_service.hub(),
        user_id: identity.subject.clone(),
        poll_id: id,
    };

    // The guard rides inside the closure so it drops with the stream.
    let stream = ReceiverStream::new(rx).map(move |event| {
        let _held = &guard;
        Ok(Event::default()
            .json_data(&event)
            .unwrap_or_else(|_| Event::default().data("error")))
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    ))
}
