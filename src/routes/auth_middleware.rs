use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::{debug, error, warn};

use crate::services::auth_service::{get_auth_token, AuthError};
use crate::state::AppState;

/// Resolve the caller's credential to an active user and hand it to the handler
/// as an `Extension<UserRecord>`.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {

    // 1. Get the auth token from the request
    let token = match get_auth_token(&req) {
        Ok(token) => token,
        Err(e) => {
            debug!("No credential on request: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    // 2. Validate it and load the user
    let user = match state.auth.resolve_user(&state.store, &token).await {
        Ok(user) => user,
        Err(AuthError::Store(e)) => {
            error!("Failed to load user for credential: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
        Err(e) => {
            warn!("Credential rejected: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    // 3. Make the user available to downstream handlers
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
