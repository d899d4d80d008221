use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A shared text file together with the ids of its collaborators
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, sqlx::FromRow)]
pub struct CodeFile {
    pub id: i64,
    pub filename: String,
    pub content: String,
    pub owner_id: i64,
    pub collaborator_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CodeFile {
    pub fn is_owner(&self, user_id: i64) -> bool {
        self.owner_id == user_id
    }

    pub fn is_collaborator(&self, user_id: i64) -> bool {
        self.collaborator_ids.contains(&user_id)
    }

    /// Owner and collaborators are checked separately; the owner is never stored as a collaborator.
    pub fn is_accessible_by(&self, user_id: i64) -> bool {
        self.is_owner(user_id) || self.is_collaborator(user_id)
    }
}

/// Request payload for creating a file
#[derive(Serialize, Deserialize, ToSchema)]
pub struct CodeFileCreate {
    pub filename: String,
}

/// Partial update of a file
#[derive(Serialize, Deserialize, ToSchema, Default, Debug, Clone)]
pub struct CodeFileUpdate {
    pub content: Option<String>,
    pub filename: Option<String>,
}

/// Paging for the owned files listing
#[derive(Deserialize, Debug)]
pub struct FileListQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}
