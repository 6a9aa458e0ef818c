//! API middleware.

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use livepoll_core::PollService;

use crate::auth::TokenVerifier;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub poll_service: PollService,
    pub token_verifier: TokenVerifier,
    pub internal_api_key: String,
    pub version: String,
}

/// Authentication middleware.
///
/// Verifies the bearer token when present and attaches the resulting
/// identity to the request; handlers that require one reject with 401 via
/// the [`crate::extractors::AuthUser`] extractor.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(auth_header) = req.headers().get("Authorization")
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
        && let Ok(identity) = state.token_verifier.verify(token)
    {
        req.extensions_mut().insert(identity);
    }

    next.run(req).await
}
