use crate::{models::OnlineUsersResponse, state::AppState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::debug;

/// Users currently connected to a sheet
pub async fn sheet_users(
    Path(sheet_id): Path<i64>,
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<OnlineUsersResponse>) {
    let users = state.hub.presence.snapshot(sheet_id);
    debug!("Presence query for sheet {}: {} user(s)", sheet_id, users.len());
    (StatusCode::OK, Json(OnlineUsersResponse { sheet_id, users }))
}
