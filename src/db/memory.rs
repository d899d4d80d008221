use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

use crate::models::{CodeFile, CodeFileUpdate, UserRecord};

#[derive(Debug, Default)]
struct MemoryState {
    next_user_id: i64,
    next_file_id: i64,
    users: BTreeMap<i64, UserRecord>,
    files: BTreeMap<i64, CodeFile>,
}

/// Process-local store used when no database is configured, and by the tests
#[derive(Debug, Default)]
pub struct MemoryDb {
    state: RwLock<MemoryState>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_user(&self, user_id: i64) -> Option<UserRecord> {
        self.state.read().await.users.get(&user_id).cloned()
    }

    pub async fn get_user_by_email(&self, email: &str) -> Option<UserRecord> {
        self.state
            .read()
            .await
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
    }

    pub async fn insert_user(&self, email: &str, hashed_password: &str) -> Option<UserRecord> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.email == email) {
            return None;
        }
        state.next_user_id += 1;
        let record = UserRecord {
            id: state.next_user_id,
            email: email.to_string(),
            hashed_password: hashed_password.to_string(),
            is_active: true,
            created_at: Utc::now(),
        };
        state.users.insert(record.id, record.clone());
        Some(record)
    }

    #[cfg(test)]
    pub async fn set_user_active(&self, user_id: i64, is_active: bool) {
        if let Some(user) = self.state.write().await.users.get_mut(&user_id) {
            user.is_active = is_active;
        }
    }

    pub async fn get_code_file(&self, file_id: i64) -> Option<CodeFile> {
        self.state.read().await.files.get(&file_id).cloned()
    }

    pub async fn list_owned_files(&self, owner_id: i64, skip: i64, limit: i64) -> Vec<CodeFile> {
        self.state
            .read()
            .await
            .files
            .values()
            .filter(|f| f.owner_id == owner_id)
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect()
    }

    pub async fn insert_code_file(&self, owner_id: i64, filename: &str) -> CodeFile {
        let mut state = self.state.write().await;
        state.next_file_id += 1;
        let now = Utc::now();
        let file = CodeFile {
            id: state.next_file_id,
            filename: filename.to_string(),
            content: String::new(),
            owner_id,
            collaborator_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        state.files.insert(file.id, file.clone());
        file
    }

    pub async fn update_code_file(&self, file_id: i64, update: &CodeFileUpdate) -> Option<CodeFile> {
        let mut state = self.state.write().await;
        let file = state.files.get_mut(&file_id)?;
        if let Some(filename) = &update.filename {
            file.filename = filename.clone();
        }
        if let Some(content) = &update.content {
            file.content = content.clone();
        }
        file.updated_at = Utc::now();
        Some(file.clone())
    }

    pub async fn delete_code_file(&self, file_id: i64) -> bool {
        self.state.write().await.files.remove(&file_id).is_some()
    }

    /// The write lock is held across read, edit and write back.
    pub async fn edit_code_file_content<F>(&self, file_id: i64, edit: F) -> Option<String>
    where
        F: FnOnce(&str) -> String,
    {
        let mut state = self.state.write().await;
        let file = state.files.get_mut(&file_id)?;
        file.content = edit(&file.content);
        file.updated_at = Utc::now();
        Some(file.content.clone())
    }

    pub async fn add_collaborator(&self, file_id: i64, user_id: i64) -> Option<CodeFile> {
        let mut state = self.state.write().await;
        let file = state.files.get_mut(&file_id)?;
        let mut ids: BTreeSet<i64> = file.collaborator_ids.iter().copied().collect();
        ids.insert(user_id);
        file.collaborator_ids = ids.into_iter().collect();
        Some(file.clone())
    }

    pub async fn remove_collaborator(&self, file_id: i64, user_id: i64) -> Option<CodeFile> {
        let mut state = self.state.write().await;
        let file = state.files.get_mut(&file_id)?;
        let before = file.collaborator_ids.len();
        file.collaborator_ids.retain(|id| *id != user_id);
        if file.collaborator_ids.len() == before {
            return None;
        }
        Some(file.clone())
    }
}
