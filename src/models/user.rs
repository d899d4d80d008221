use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A registered account as stored, including the password hash
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub hashed_password: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// The public view of an account
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub is_active: bool,
}

impl From<&UserRecord> for User {
    fn from(record: &UserRecord) -> Self {
        Self {
            id: record.id,
            email: record.email.clone(),
            is_active: record.is_active,
        }
    }
}

/// Request payload for registering an account
#[derive(Serialize, Deserialize, ToSchema)]
pub struct UserCreate {
    pub email: String,
    pub password: String,
}

/// Form payload for the password login
#[derive(Serialize, Deserialize, ToSchema)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Issued access token
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
}
