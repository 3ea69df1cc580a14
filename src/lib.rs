pub mod config;
pub mod db;
pub mod docs;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod websocket;
pub mod ws;

use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use docs::ApiDoc;
use routes::{create_api_routes, create_ws_routes};
use state::AppState;

/// Assembles the HTTP API, the WebSocket upgrade route and Swagger UI.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        // Mount API routes
        .nest("/api", create_api_routes(state.clone()))
        // Mount the sheet WebSocket
        .merge(create_ws_routes(state))
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add tracing layer
        .layer(TraceLayer::new_for_http())
}
