//! Poll endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
};
use livepoll_common::{AppError, AppResult};
use livepoll_core::{PollData, PollResult};
use livepoll_db::entities::poll::PollVote;
use livepoll_db::repositories::PollsFilter;

use crate::{extractors::AuthUser, middleware::AppState, sse};

/// The listing filter arrives as an optional JSON request body on GET.
fn parse_filter(body: &str) -> AppResult<PollsFilter> {
    if body.trim().is_empty() {
        return Ok(PollsFilter::default());
    }
    serde_json::from_str(body).map_err(|e| AppError::BadRequest(format!("invalid filter: {e}")))
}

/// List polls matching an optional filter, projected for the caller.
async fn get_polls(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    body: String,
) -> AppResult<Json<Vec<PollResult>>> {
    let filter = parse_filter(&body)?;
    let results = state.poll_service.get_polls(&identity, &filter, false).await?;
    Ok(Json(results))
}

/// List the caller's own polls, with the same optional filter.
async fn get_user_polls(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    body: String,
) -> AppResult<Json<Vec<PollResult>>> {
    let filter = parse_filter(&body)?;
    let results = state.poll_service.get_polls(&identity, &filter, true).await?;
    Ok(Json(results))
}

/// Create a poll.
async fn create_poll(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    Json(data): Json<PollData>,
) -> AppResult<Json<PollResult>> {
    let result = state.poll_service.create(&identity, &data).await?;
    Ok(Json(result))
}

/// Fetch a poll by id.
async fn get_poll(
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> AppResult<Json<PollResult>> {
    let result = state.poll_service.get_poll(&identity, &id).await?;
    Ok(Json(result))
}

/// Update a poll.
async fn update_poll(
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(data): Json<PollData>,
) -> AppResult<Json<PollResult>> {
    let result = state.poll_service.update(&identity, &id, &data).await?;
    Ok(Json(result))
}

/// Delete a poll.
async fn delete_poll(
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> AppResult<StatusCode> {
    state.poll_service.delete(&identity, &id).await?;
    Ok(StatusCode::OK)
}

/// Cast a vote on a poll.
async fn vote_poll(
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(vote): Json<PollVote>,
) -> AppResult<StatusCode> {
    if vote.user_id != identity.subject {
        return Err(AppError::BadRequest("inconsistent user id".to_string()));
    }

    state.poll_service.vote(&identity, &id, &vote).await?;
    Ok(StatusCode::OK)
}

/// Start a poll.
async fn start_poll(
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> AppResult<StatusCode> {
    state.poll_service.start(&identity, &id).await?;
    Ok(StatusCode::OK)
}

/// End a poll.
async fn end_poll(
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> AppResult<StatusCode> {
    state.poll_service.end(&identity, &id).await?;
    Ok(StatusCode::OK)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/polls", get(get_polls).post(create_poll))
        .route("/user/polls", get(get_user_polls))
        .route(
            "/polls/{id}",
            get(get_poll).put(update_poll).delete(delete_poll),
        )
        .route("/polls/{id}/vote", put(vote_poll))
        .route("/polls/{id}/start", put(start_poll))
        .route("/polls/{id}/end", put(end_poll))
        .route("/polls/{id}/events", get(sse::poll_events))
}
