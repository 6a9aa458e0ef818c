//! Internal endpoints, guarded by the internal API key.

use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::HeaderMap,
    routing::{delete, get},
};
use livepoll_common::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::middleware::AppState;

const INTERNAL_API_KEY_HEADER: &str = "INTERNAL-API-KEY";

fn require_internal_key(state: &AppState, headers: &HeaderMap) -> AppResult<()> {
    let presented = headers
        .get(INTERNAL_API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if state.internal_api_key.is_empty() || presented != state.internal_api_key {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct DeleteAccountsRequest {
    org_id: String,
    account_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct DeleteAccountsResponse {
    deleted_count: u64,
}

/// Delete every poll created by the listed accounts. Serves the
/// account-deletion sweeper of the platform.
async fn delete_accounts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<DeleteAccountsRequest>,
) -> AppResult<Json<DeleteAccountsResponse>> {
    require_internal_key(&state, &headers)?;

    let deleted_count = state
        .poll_service
        .delete_account_data(&request.org_id, &request.account_ids)
        .await?;

    Ok(Json(DeleteAccountsResponse { deleted_count }))
}

#[derive(Debug, Deserialize)]
struct GroupPollsQuery {
    org_id: String,
}

/// Map every group-scoped poll in a tenant to its group id.
async fn group_polls(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<GroupPollsQuery>,
) -> AppResult<Json<HashMap<String, String>>> {
    require_internal_key(&state, &headers)?;

    let mapping = state.poll_service.group_poll_mapping(&query.org_id).await?;
    Ok(Json(mapping))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/int/accounts", delete(delete_accounts))
        .route("/int/group-polls", get(group_polls))
}
