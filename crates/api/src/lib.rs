//! HTTP surface for livepoll.
//!
//! Exposes the poll API under `/api`, the SSE event stream and the auth
//! middleware that turns bearer tokens into request identities.

pub mod auth;
pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod sse;

use axum::{Router, extract::State};

pub use auth::TokenVerifier;
pub use middleware::{AppState, auth_middleware};

/// The service version string.
pub async fn version(State(state): State<AppState>) -> String {
    state.version.clone()
}

/// Build the `/api` router.
#[must_use]
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(endpoints::poll::router())
        .merge(endpoints::internal::router())
}
