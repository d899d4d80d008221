use axum::{extract::{Extension, State}, http::StatusCode, Form, Json};
use tracing::{error, info};

use crate::db::store::StoreError;
use crate::models::{ApiError, ErrorResponse, LoginForm, Token, User, UserCreate, UserRecord};
use crate::state::AppState;

/// Register an account
pub async fn register_user(
    State(state): State<AppState>,
    Json(request): Json<UserCreate>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(ErrorResponse::reply(StatusCode::BAD_REQUEST, "Email and password are required"));
    }

    let hashed = state.auth.hash_password(&request.password).await.map_err(|e| {
        error!("Failed to hash password: {}", e);
        ErrorResponse::internal()
    })?;

    match state.store.create_user(&request.email, &hashed).await {
        Ok(record) => {
            info!("Registered user {}", record.id);
            Ok((StatusCode::CREATED, Json(User::from(&record))))
        }
        Err(StoreError::Conflict(_)) => Err(ErrorResponse::reply(StatusCode::BAD_REQUEST, "Email already registered")),
        Err(e) => {
            error!("Failed to register user: {}", e);
            Err(ErrorResponse::internal())
        }
    }
}

/// Exchange email and password for an access token
pub async fn login_for_access_token(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<(StatusCode, Json<Token>), ApiError> {
    let user = state
        .auth
        .verify_login(&state.store, &form.username, &form.password)
        .await
        .map_err(|e| {
            error!("Login failed unexpectedly: {}", e);
            ErrorResponse::internal()
        })?
        .ok_or_else(|| ErrorResponse::reply(StatusCode::UNAUTHORIZED, "Incorrect username or password"))?;

    let access_token = state.auth.issue_token(user.id).map_err(|e| {
        error!("Failed to issue token for user {}: {}", user.id, e);
        ErrorResponse::internal()
    })?;

    Ok((StatusCode::OK, Json(Token {
        access_token,
        token_type: "bearer".to_string(),
    })))
}

/// The authenticated caller
pub async fn read_users_me(
    Extension(user): Extension<UserRecord>,
) -> Json<User> {
    Json(User::from(&user))
}
