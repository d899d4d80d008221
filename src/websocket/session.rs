use axum::extract::ws::close_code;

use crate::db::store::{FileStore, StoreError};
use crate::models::{SendMessage, Stamped};
use crate::services::auth_service::AuthError;
use crate::ws::broadcast::Broadcaster;

/// Why a join was refused
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),
    #[error("user {user_id} is neither owner nor collaborator of file {file_id}")]
    Authorization { user_id: i64, file_id: i64 },
    #[error("file {0} not found")]
    NotFound(i64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SessionError {
    pub fn close_code(&self) -> u16 {
        match self {
            Self::Store(_) | Self::Authentication(AuthError::Store(_)) => close_code::ERROR,
            _ => close_code::POLICY,
        }
    }

    /// Reason sent in the close frame; carries no detail beyond the category
    pub fn close_reason(&self) -> &'static str {
        match self {
            Self::Authentication(AuthError::Store(_)) | Self::Store(_) => "Internal error",
            Self::Authentication(_) => "Invalid authentication credentials",
            Self::Authorization { .. } | Self::NotFound(_) => "Not authorized to edit this file",
        }
    }
}

/// What one joined connection knows about itself
#[derive(Clone)]
pub struct SessionCtx {
    pub file_id: i64,
    pub user_id: i64,
    pub store: FileStore,
    pub broadcaster: Broadcaster,
}

impl SessionCtx {
    /// Attach the server-side identity of this connection to a client message
    pub fn stamp<T>(&self, body: T) -> Stamped<T> {
        Stamped {
            body,
            user_id: self.user_id,
            file_id: self.file_id,
        }
    }

    /// Relay to everyone on the file except this connection's user
    pub fn relay(&self, msg: &SendMessage) -> usize {
        self.broadcaster.broadcast(self.file_id, msg, Some(self.user_id))
    }
}
