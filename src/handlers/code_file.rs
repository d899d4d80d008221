use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use super::{load_file, store_failure};
use crate::auth::access::{ensure_owner, ensure_owner_or_collaborator};
use crate::models::{ApiError, CodeFile, CodeFileCreate, CodeFileUpdate, ErrorResponse, FileListQuery, UserRecord};
use crate::state::AppState;

/// Create an empty file owned by the caller
pub async fn create_code_file(
    State(state): State<AppState>,
    Extension(user): Extension<UserRecord>,
    Json(request): Json<CodeFileCreate>,
) -> Result<(StatusCode, Json<CodeFile>), ApiError> {
    if request.filename.trim().is_empty() {
        return Err(ErrorResponse::reply(StatusCode::BAD_REQUEST, "Filename is required"));
    }

    let file = state
        .store
        .create_file(user.id, &request.filename)
        .await
        .map_err(|e| store_failure("Failed to create file", e))?;

    info!("User {} created file {} ('{}')", user.id, file.id, file.filename);
    Ok((StatusCode::CREATED, Json(file)))
}

/// List the files owned by the caller
pub async fn list_code_files(
    State(state): State<AppState>,
    Extension(user): Extension<UserRecord>,
    Query(paging): Query<FileListQuery>,
) -> Result<Json<Vec<CodeFile>>, ApiError> {
    let skip = paging.skip.max(0);
    let limit = paging.limit.clamp(0, 1000);
    let files = state
        .store
        .list_owned_files(user.id, skip, limit)
        .await
        .map_err(|e| store_failure("Failed to list files", e))?;
    Ok(Json(files))
}

pub async fn get_code_file(
    State(state): State<AppState>,
    Extension(user): Extension<UserRecord>,
    Path(file_id): Path<i64>,
) -> Result<Json<CodeFile>, ApiError> {
    let file = load_file(&state.store, file_id).await?;
    ensure_owner_or_collaborator(&file, user.id)?;
    Ok(Json(file))
}

/// Replace the name and/or content of a file. Connected editors are not notified.
pub async fn update_code_file(
    State(state): State<AppState>,
    Extension(user): Extension<UserRecord>,
    Path(file_id): Path<i64>,
    Json(update): Json<CodeFileUpdate>,
) -> Result<Json<CodeFile>, ApiError> {
    let file = load_file(&state.store, file_id).await?;
    ensure_owner(&file, user.id, "update this file")?;

    let updated = state
        .store
        .update_file(file_id, &update)
        .await
        .map_err(|e| store_failure(&format!("Failed to update file {}", file_id), e))?
        .ok_or_else(|| ErrorResponse::reply(StatusCode::NOT_FOUND, "File not found"))?;

    info!("User {} updated file {}", user.id, file_id);
    Ok(Json(updated))
}

/// Delete a file and close every live connection on it
pub async fn delete_code_file(
    State(state): State<AppState>,
    Extension(user): Extension<UserRecord>,
    Path(file_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let file = load_file(&state.store, file_id).await?;
    ensure_owner(&file, user.id, "delete this file")?;

    let deleted = state
        .store
        .delete_file(file_id)
        .await
        .map_err(|e| store_failure(&format!("Failed to delete file {}", file_id), e))?;
    if !deleted {
        return Err(ErrorResponse::reply(StatusCode::NOT_FOUND, "File not found"));
    }

    let closed = state.registry().close_file(file_id);
    info!("File {} deleted by user {}, closed {} connection(s)", file_id, user.id, closed);
    Ok(StatusCode::NO_CONTENT)
}
