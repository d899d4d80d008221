use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "system",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/api/ready",
    tag = "system",
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Register an account
#[utoipa::path(
    post,
    path = "/api/users/register",
    tag = "users",
    request_body = UserCreate,
    responses(
        (status = 201, description = "Account created", body = User),
        (status = 400, description = "Email already registered", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn register_user_doc() {}

/// Exchange email and password for an access token
#[utoipa::path(
    post,
    path = "/api/users/login",
    tag = "users",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Access token issued", body = Token),
        (status = 401, description = "Incorrect username or password", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn login_doc() {}

/// The authenticated caller
#[utoipa::path(
    get,
    path = "/api/users/me",
    tag = "users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Missing or invalid credential")
    )
)]
#[allow(dead_code)]
pub async fn read_users_me_doc() {}

/// Create a file owned by the caller
#[utoipa::path(
    post,
    path = "/api/files",
    tag = "files",
    security(("bearer" = [])),
    request_body = CodeFileCreate,
    responses(
        (status = 201, description = "File created", body = CodeFile)
    )
)]
#[allow(dead_code)]
pub async fn create_code_file_doc() {}

/// List the files owned by the caller
#[utoipa::path(
    get,
    path = "/api/files",
    tag = "files",
    security(("bearer" = [])),
    params(
        ("skip" = Option<i64>, Query, description = "Number of files to skip"),
        ("limit" = Option<i64>, Query, description = "Maximum number of files to return")
    ),
    responses(
        (status = 200, description = "Owned files", body = [CodeFile])
    )
)]
#[allow(dead_code)]
pub async fn list_code_files_doc() {}

/// Fetch a file the caller owns or collaborates on
#[utoipa::path(
    get,
    path = "/api/files/{file_id}",
    tag = "files",
    security(("bearer" = [])),
    params(("file_id" = i64, Path, description = "File id")),
    responses(
        (status = 200, description = "The file", body = CodeFile),
        (status = 403, description = "Not owner or collaborator", body = ErrorResponse),
        (status = 404, description = "File not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn get_code_file_doc() {}

/// Update the name and/or content of a file
#[utoipa::path(
    put,
    path = "/api/files/{file_id}",
    tag = "files",
    security(("bearer" = [])),
    params(("file_id" = i64, Path, description = "File id")),
    request_body = CodeFileUpdate,
    responses(
        (status = 200, description = "Updated file", body = CodeFile),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "File not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn update_code_file_doc() {}

/// Delete a file and close its live sessions
#[utoipa::path(
    delete,
    path = "/api/files/{file_id}",
    tag = "files",
    security(("bearer" = [])),
    params(("file_id" = i64, Path, description = "File id")),
    responses(
        (status = 204, description = "File deleted"),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "File not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn delete_code_file_doc() {}

/// Grant a registered user edit access
#[utoipa::path(
    post,
    path = "/api/collaboration/{file_id}/add_collaborator",
    tag = "collaboration",
    security(("bearer" = [])),
    params(("file_id" = i64, Path, description = "File id")),
    request_body = AddCollaborator,
    responses(
        (status = 200, description = "Updated file", body = CodeFile),
        (status = 400, description = "Owner cannot be a collaborator", body = ErrorResponse),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn add_collaborator_doc() {}

/// Revoke a collaborator's edit access
#[utoipa::path(
    post,
    path = "/api/collaboration/{file_id}/remove_collaborator",
    tag = "collaboration",
    security(("bearer" = [])),
    params(("file_id" = i64, Path, description = "File id")),
    request_body = RemoveCollaborator,
    responses(
        (status = 200, description = "Updated file", body = CodeFile),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "Collaborator not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn remove_collaborator_doc() {}

/// Live editing session. Upgrades to a WebSocket; rejected joins are closed with code 1008.
#[utoipa::path(
    get,
    path = "/api/collaboration/ws/{file_id}",
    tag = "collaboration",
    params(
        ("file_id" = i64, Path, description = "File id"),
        ("token" = String, Query, description = "Access token")
    ),
    responses(
        (status = 101, description = "Switching to the WebSocket protocol")
    )
)]
#[allow(dead_code)]
pub async fn collaboration_ws_doc() {}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        register_user_doc,
        login_doc,
        read_users_me_doc,
        create_code_file_doc,
        list_code_files_doc,
        get_code_file_doc,
        update_code_file_doc,
        delete_code_file_doc,
        add_collaborator_doc,
        remove_collaborator_doc,
        collaboration_ws_doc,
    ),
    components(
        schemas(
            HealthResponse, ErrorResponse, User, UserCreate, LoginForm, Token,
            CodeFile, CodeFileCreate, CodeFileUpdate, AddCollaborator, RemoveCollaborator,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "system", description = "Liveness and readiness"),
        (name = "users", description = "Accounts and access tokens"),
        (name = "files", description = "Shared text files"),
        (name = "collaboration", description = "Collaborators and live editing")
    )
)]
pub struct ApiDoc;
