use axum::http::{self};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::auth::userctx::UserCtxCache;
use crate::db::store::{FileStore, StoreError};
use crate::models::UserRecord;

const AUTH_COOKIE: &str = "access_token";
const USER_TOKEN_TYPE: &str = "user";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing credential: {0}")]
    MissingToken(String),
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("malformed token claims: {0}")]
    MalformedClaims(String),
    #[error("user {0} not found")]
    UnknownUser(i64),
    #[error("user {0} is inactive")]
    InactiveUser(i64),
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(rename = "type")]
    type_: String,
    exp: usize,
}

/// Issues and checks credentials, mapping a token to a user.
pub struct AuthService {
    jwt_secret: String,
    token_ttl: Duration,
    bcrypt_cost: u32,
    users: UserCtxCache,
}

impl AuthService {
    pub fn new(jwt_secret: String, token_ttl_minutes: i64, bcrypt_cost: u32) -> Self {
        Self {
            jwt_secret,
            token_ttl: Duration::minutes(token_ttl_minutes),
            bcrypt_cost,
            users: UserCtxCache::new(),
        }
    }

    /// Sign an access token for a user
    pub fn issue_token(&self, user_id: i64) -> Result<String, AuthError> {
        let expiration = (Utc::now() + self.token_ttl).timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            type_: USER_TOKEN_TYPE.to_string(),
            exp: expiration as usize,
        };
        Ok(encode(&Header::default(), &claims, &EncodingKey::from_secret(self.jwt_secret.as_bytes()))?)
    }

    /// Validate a token and return the user id it was issued for
    pub fn validate_token(&self, token: &str) -> Result<i64, AuthError> {
        let token_data = validate_jwt(token, &self.jwt_secret)?;
        if token_data.claims.type_ != USER_TOKEN_TYPE {
            return Err(AuthError::MalformedClaims(format!("unexpected token type '{}'", token_data.claims.type_)));
        }
        token_data
            .claims
            .sub
            .parse::<i64>()
            .map_err(|_| AuthError::MalformedClaims("'sub' is not a user id".to_string()))
    }

    /// Map a credential to an active user
    pub async fn resolve_user(&self, store: &FileStore, token: &str) -> Result<UserRecord, AuthError> {
        let user_id = self.validate_token(token)?;

        let user = match self.users.get(user_id).await {
            Some(user) => user,
            None => {
                debug!("User context cache miss for user {}", user_id);
                let user = store.get_user(user_id).await?.ok_or(AuthError::UnknownUser(user_id))?;
                self.users.insert(user.clone()).await;
                user
            }
        };

        if !user.is_active {
            warn!("Rejected credential of inactive user {}", user_id);
            return Err(AuthError::InactiveUser(user_id));
        }
        Ok(user)
    }

    /// Check an email/password pair. Unknown, inactive and wrong-password all yield `None`.
    pub async fn verify_login(
        &self,
        store: &FileStore,
        email: &str,
        password: &str,
    ) -> Result<Option<UserRecord>, AuthError> {
        let Some(user) = store.get_user_by_email(email).await? else {
            return Ok(None);
        };
        if !user.is_active {
            return Ok(None);
        }
        if !verify_password(password, &user.hashed_password).await? {
            return Ok(None);
        }
        info!("User {} logged in", user.id);
        Ok(Some(user))
    }

    pub async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let password = password.to_string();
        let cost = self.bcrypt_cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?
            .map_err(|e| AuthError::Hashing(e.to_string()))
    }
}

async fn verify_password(password: &str, hashed: &str) -> Result<bool, AuthError> {
    let password = password.to_string();
    let hashed = hashed.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hashed))
        .await
        .map_err(|e| AuthError::Hashing(e.to_string()))?
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

// Get the auth token from a request
pub fn get_auth_token<B>(req: &http::Request<B>) -> Result<String, String> {
    // 1. Try to get token from Authorization header
    if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
        let auth_str = auth_header.to_str().map_err(|_| "Invalid Authorization header".to_string())?;
        Ok(auth_str
            .strip_prefix("Bearer ")
            .unwrap_or(auth_str)
            .to_string())
    }
    // 2. Try to get token from cookies
    else {
        let cookie_header = req.headers().get(http::header::COOKIE)
            .ok_or_else(|| "Missing Authorization header or Cookie".to_string())?
            .to_str()
            .map_err(|_| "Invalid Cookie header".to_string())?;

        for c in cookie::Cookie::split_parse(cookie_header).flatten() {
            if c.name() == AUTH_COOKIE {
                return Ok(c.value().to_string());
            }
        }
        Err(format!("{} cookie not found", AUTH_COOKIE))
    }
}

// Validate a JWT token and return the token data
fn validate_jwt(token: &str, secret: &str) -> Result<TokenData<Claims>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<Claims>(token, &decoding_key, &validation)
}
