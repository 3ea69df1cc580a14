use crate::handlers::{diagnostics, health_check, ready_check, sheet_users};
use crate::routes::auth_middleware::auth_middleware;
use crate::state::AppState;
use crate::websocket::websocket_handler;
use axum::{middleware, routing::get, Router};
use std::sync::Arc;

/// Create API routes
pub fn create_api_routes(state: Arc<AppState>) -> Router {
    Router::<Arc<AppState>>::new()
        .route("/v1/diagnostics", get(diagnostics))
        .route("/v1/sheets/:sheet_id/users", get(sheet_users))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware)) // Applies to all routes added above
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .with_state(state)
}

/// Create the WebSocket upgrade route
pub fn create_ws_routes(state: Arc<AppState>) -> Router {
    Router::<Arc<AppState>>::new()
        .route("/ws/sheets/:sheet_id", get(websocket_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
