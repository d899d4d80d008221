use std::sync::Arc;
use tracing::info;

use super::dbcolab::DbColab;
use super::memory::MemoryDb;
use crate::models::{CodeFile, CodeFileUpdate, UserRecord};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Persistent home of users, files and collaborator relationships
#[derive(Clone)]
pub enum FileStore {
    Postgres(Arc<DbColab>),
    Memory(Arc<MemoryDb>),
}

impl FileStore {
    /// Connect to PostgreSQL and make sure the tables exist
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let db = DbColab::new(database_url).await?;
        db.ensure_schema().await?;
        Ok(Self::Postgres(Arc::new(db)))
    }

    pub fn in_memory() -> Self {
        info!("Using in-memory file store");
        Self::Memory(Arc::new(MemoryDb::new()))
    }

    /// Check the backing store can serve requests
    pub async fn ping(&self) -> Result<(), StoreError> {
        match self {
            Self::Postgres(db) => Ok(db.ping().await?),
            Self::Memory(_) => Ok(()),
        }
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<UserRecord>, StoreError> {
        match self {
            Self::Postgres(db) => Ok(db.get_user(user_id).await?),
            Self::Memory(db) => Ok(db.get_user(user_id).await),
        }
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        match self {
            Self::Postgres(db) => Ok(db.get_user_by_email(email).await?),
            Self::Memory(db) => Ok(db.get_user_by_email(email).await),
        }
    }

    /// Fails with `StoreError::Conflict` when the email is already registered
    pub async fn create_user(&self, email: &str, hashed_password: &str) -> Result<UserRecord, StoreError> {
        let created = match self {
            Self::Postgres(db) => db.insert_user(email, hashed_password).await?,
            Self::Memory(db) => db.insert_user(email, hashed_password).await,
        };
        created.ok_or_else(|| StoreError::Conflict(format!("email '{}' already registered", email)))
    }

    pub async fn create_file(&self, owner_id: i64, filename: &str) -> Result<CodeFile, StoreError> {
        match self {
            Self::Postgres(db) => Ok(db.insert_code_file(owner_id, filename).await?),
            Self::Memory(db) => Ok(db.insert_code_file(owner_id, filename).await),
        }
    }

    pub async fn get_file(&self, file_id: i64) -> Result<Option<CodeFile>, StoreError> {
        match self {
            Self::Postgres(db) => Ok(db.get_code_file(file_id).await?),
            Self::Memory(db) => Ok(db.get_code_file(file_id).await),
        }
    }

    pub async fn list_owned_files(&self, owner_id: i64, skip: i64, limit: i64) -> Result<Vec<CodeFile>, StoreError> {
        match self {
            Self::Postgres(db) => Ok(db.list_owned_files(owner_id, skip, limit).await?),
            Self::Memory(db) => Ok(db.list_owned_files(owner_id, skip, limit).await),
        }
    }

    pub async fn update_file(&self, file_id: i64, update: &CodeFileUpdate) -> Result<Option<CodeFile>, StoreError> {
        match self {
            Self::Postgres(db) => Ok(db.update_code_file(file_id, update).await?),
            Self::Memory(db) => Ok(db.update_code_file(file_id, update).await),
        }
    }

    pub async fn delete_file(&self, file_id: i64) -> Result<bool, StoreError> {
        match self {
            Self::Postgres(db) => Ok(db.delete_code_file(file_id).await?),
            Self::Memory(db) => Ok(db.delete_code_file(file_id).await),
        }
    }

    /// Apply `edit` to the current content of a file and persist the result atomically.
    ///
    /// Returns the new content, or `None` if the file no longer exists.
    pub async fn edit_content<F>(&self, file_id: i64, edit: F) -> Result<Option<String>, StoreError>
    where
        F: FnOnce(&str) -> String + Send,
    {
        match self {
            Self::Postgres(db) => Ok(db.edit_code_file_content(file_id, edit).await?),
            Self::Memory(db) => Ok(db.edit_code_file_content(file_id, edit).await),
        }
    }

    /// Returns `None` when the file does not exist
    pub async fn add_collaborator(&self, file_id: i64, user_id: i64) -> Result<Option<CodeFile>, StoreError> {
        match self {
            Self::Postgres(db) => Ok(db.add_collaborator(file_id, user_id).await?),
            Self::Memory(db) => Ok(db.add_collaborator(file_id, user_id).await),
        }
    }

    /// Returns `None` when the user was not a collaborator of the file
    pub async fn remove_collaborator(&self, file_id: i64, user_id: i64) -> Result<Option<CodeFile>, StoreError> {
        match self {
            Self::Postgres(db) => Ok(db.remove_collaborator(file_id, user_id).await?),
            Self::Memory(db) => Ok(db.remove_collaborator(file_id, user_id).await),
        }
    }
}
