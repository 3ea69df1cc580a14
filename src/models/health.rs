use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of the liveness and readiness checks
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct HealthResponse {
    /// `ok` or `unavailable`
    pub status: String,
    pub message: String,
}
