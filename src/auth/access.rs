use axum::http::StatusCode;

use crate::models::{ApiError, CodeFile, ErrorResponse};

pub fn ensure_owner(file: &CodeFile, user_id: i64, action: &str) -> Result<(), ApiError> {
    if file.is_owner(user_id) {
        return Ok(());
    }
    Err(ErrorResponse::reply(
        StatusCode::FORBIDDEN,
        format!("Only the owner can {}", action),
    ))
}

pub fn ensure_owner_or_collaborator(file: &CodeFile, user_id: i64) -> Result<(), ApiError> {
    if file.is_accessible_by(user_id) {
        return Ok(());
    }
    Err(ErrorResponse::reply(
        StatusCode::FORBIDDEN,
        "Not authorized to access this file",
    ))
}
