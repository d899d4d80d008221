use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Request payload for granting edit access
#[derive(Serialize, Deserialize, ToSchema)]
pub struct AddCollaborator {
    pub email: String,
}

/// Request payload for revoking edit access
#[derive(Serialize, Deserialize, ToSchema)]
pub struct RemoveCollaborator {
    pub user_id: i64,
}
