use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/api/ready",
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse),
        (status = 503, description = "Storage is unreachable", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Users currently connected to a sheet
#[utoipa::path(
    get,
    path = "/api/v1/sheets/{sheet_id}/users",
    params(
        ("sheet_id" = i64, Path, description = "Sheet id")
    ),
    responses(
        (status = 200, description = "Presence snapshot", body = OnlineUsersResponse),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = []))
)]
#[allow(dead_code)]
pub async fn sheet_users_doc() {}

/// Process and synchronization statistics
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Diagnostics", body = DiagnosticsResponse),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = []))
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

/// Upgrade to the sheet synchronization WebSocket
#[utoipa::path(
    get,
    path = "/ws/sheets/{sheet_id}",
    params(
        ("sheet_id" = i64, Path, description = "Sheet id")
    ),
    responses(
        (status = 101, description = "Switching protocols"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Unknown user", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[allow(dead_code)]
pub async fn sheet_socket_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        sheet_users_doc,
        diagnostics_doc,
        sheet_socket_doc,
    ),
    components(
        schemas(HealthResponse, OnlineUser, OnlineUsersResponse, DiagnosticsResponse, ErrorResponse)
    ),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;
