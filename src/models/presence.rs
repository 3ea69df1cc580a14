use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A user currently viewing a sheet
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
pub struct OnlineUser {
    pub user_id: i64,
    pub username: String,
    /// Number of open sessions the user has on this sheet
    pub connections: u32,
}

/// Response for a presence query
#[derive(Serialize, Deserialize, ToSchema)]
pub struct OnlineUsersResponse {
    pub sheet_id: i64,
    pub users: Vec<OnlineUser>,
}
