use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use super::store_failure;
use crate::auth::access::ensure_owner;
use crate::db::store::FileStore;
use crate::models::{AddCollaborator, ApiError, CodeFile, ErrorResponse, RemoveCollaborator, UserRecord};
use crate::state::AppState;

/// Grant a registered user edit access to a file
pub async fn add_collaborator(
    State(state): State<AppState>,
    Extension(user): Extension<UserRecord>,
    Path(file_id): Path<i64>,
    Json(request): Json<AddCollaborator>,
) -> Result<Json<CodeFile>, ApiError> {
    let file = owned_file(&state.store, file_id, user.id, "add collaborators").await?;

    let collaborator = state
        .store
        .get_user_by_email(&request.email)
        .await
        .map_err(|e| store_failure("Failed to look up collaborator", e))?
        .ok_or_else(|| ErrorResponse::reply(StatusCode::NOT_FOUND, "User not found"))?;

    if collaborator.id == file.owner_id {
        return Err(ErrorResponse::reply(StatusCode::BAD_REQUEST, "Owner cannot be added as a collaborator"));
    }

    let file = state
        .store
        .add_collaborator(file_id, collaborator.id)
        .await
        .map_err(|e| store_failure(&format!("Failed to add collaborator to file {}", file_id), e))?
        .ok_or_else(|| ErrorResponse::reply(StatusCode::NOT_FOUND, "File not found"))?;

    info!("User {} can now edit file {}", collaborator.id, file_id);
    Ok(Json(file))
}

/// Revoke a collaborator's access. Open sessions keep running until they disconnect.
pub async fn remove_collaborator(
    State(state): State<AppState>,
    Extension(user): Extension<UserRecord>,
    Path(file_id): Path<i64>,
    Json(request): Json<RemoveCollaborator>,
) -> Result<Json<CodeFile>, ApiError> {
    owned_file(&state.store, file_id, user.id, "remove collaborators").await?;

    let file = state
        .store
        .remove_collaborator(file_id, request.user_id)
        .await
        .map_err(|e| store_failure(&format!("Failed to remove collaborator from file {}", file_id), e))?
        .ok_or_else(|| ErrorResponse::reply(StatusCode::NOT_FOUND, "Collaborator not found"))?;

    info!("User {} can no longer edit file {}", request.user_id, file_id);
    Ok(Json(file))
}

/// A missing file answers like a foreign one so ids of other users' files are not revealed
async fn owned_file(store: &FileStore, file_id: i64, user_id: i64, action: &str) -> Result<CodeFile, ApiError> {
    let file = store
        .get_file(file_id)
        .await
        .map_err(|e| store_failure(&format!("Failed to load file {}", file_id), e))?
        .ok_or_else(|| ErrorResponse::reply(StatusCode::FORBIDDEN, format!("Only the owner can {}", action)))?;
    ensure_owner(&file, user_id, action)?;
    Ok(file)
}
