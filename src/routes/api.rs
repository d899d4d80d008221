use crate::{
    handlers::{
        add_collaborator, create_code_file, delete_code_file, get_code_file, health_check, list_code_files,
        login_for_access_token, read_users_me, ready_check, register_user, remove_collaborator, update_code_file,
    },
    routes::auth_middleware::auth_middleware,
    state::AppState,
    websocket::handler::websocket_handler,
};
use axum::{middleware, routing::{get, post}, Router};

/// Create API routes
pub fn create_api_routes(state: AppState) -> Router {
    Router::<AppState>::new()
        .route("/users/me", get(read_users_me))
        .route("/files", post(create_code_file).get(list_code_files))
        .route("/files/:file_id", get(get_code_file).put(update_code_file).delete(delete_code_file))
        .route("/collaboration/:file_id/add_collaborator", post(add_collaborator))
        .route("/collaboration/:file_id/remove_collaborator", post(remove_collaborator))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware)) // Applies to all routes added above
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .route("/users/register", post(register_user))
        .route("/users/login", post(login_for_access_token))
        // The session authenticates with its `token` query parameter
        .route("/collaboration/ws/:file_id", get(websocket_handler))
        .with_state(state)
}
