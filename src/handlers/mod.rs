pub mod code_file;
pub mod collaboration;
pub mod health;
pub mod user;

pub use code_file::*;
pub use collaboration::*;
pub use health::*;
pub use user::*;

use axum::http::StatusCode;
use tracing::error;

use crate::db::store::{FileStore, StoreError};
use crate::models::{ApiError, CodeFile, ErrorResponse};

/// Log a store failure and hide its details from the caller
pub(crate) fn store_failure(context: &str, e: StoreError) -> ApiError {
    error!("{}: {}", context, e);
    ErrorResponse::internal()
}

/// Fetch a file or answer 404
pub(crate) async fn load_file(store: &FileStore, file_id: i64) -> Result<CodeFile, ApiError> {
    store
        .get_file(file_id)
        .await
        .map_err(|e| store_failure(&format!("Failed to load file {}", file_id), e))?
        .ok_or_else(|| ErrorResponse::reply(StatusCode::NOT_FOUND, "File not found"))
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::db::store::FileStore;
    use crate::routes::create_app;
    use crate::services::auth_service::AuthService;
    use crate::state::AppState;

    pub fn test_state() -> AppState {
        AppState::new(Config::default(), FileStore::in_memory(), AuthService::new("test-secret".into(), 30, 4))
    }

    /// Create a user directly in the store and issue a token for it
    pub async fn user_with_token(state: &AppState, email: &str) -> (i64, String) {
        let record = state.store.create_user(email, "unused").await.unwrap();
        (record.id, state.auth.issue_token(record.id).unwrap())
    }

    pub async fn call(
        state: &AppState,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();

        let res = create_app(state.clone()).oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }
}
