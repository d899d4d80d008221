mod auth;
mod config;
mod db;
mod docs;
mod handlers;
mod models;
mod routes;
mod services;
mod state;
mod utils;
mod websocket;
mod ws;

use config::Config;
use db::store::FileStore;
use routes::create_app;
use services::auth_service::AuthService;
use state::AppState;
use tracing::{info, error, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use std::panic;

#[tokio::main]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}, using defaults");
        Config::default()
    });

    // Initialize tracing
    let log_level = config.log_level.clone();
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!("codecolab={log_level},tower_http=debug,axum::rejection=trace,info").into()
        }))
        .init();

    info!("Starting server...");

    // Open the file store
    let store = match &config.db_url {
        Some(db_url) => match FileStore::connect(db_url).await {
            Ok(store) => {
                info!("Database initialized successfully");
                store
            }
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            warn!("No database URL configured - files and users are kept in memory only");
            FileStore::in_memory()
        }
    };

    // Signing secret for access tokens
    let jwt_secret = match &config.auth_jwt_secret {
        Some(secret) => secret.clone(),
        None => {
            warn!("No JWT secret configured - using an ephemeral secret, tokens will not survive a restart");
            format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
        }
    };
    let auth = AuthService::new(jwt_secret, config.access_token_expire_minutes, config.bcrypt_cost);

    let address = config.server_address();
    let state = AppState::new(config, store, auth);
    let app_routes = create_app(state);

    // Start the HTTP/API server
    let listener = match tokio::net::TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", address, e);
            std::process::exit(1);
        }
    };

    info!("🚀 Server running on http://{}", address);
    info!("📡 Collaboration sessions at ws://{}/api/collaboration/ws/{{file_id}}", address);
    info!("📚 Swagger UI available at http://{}/swagger", address);

    if let Err(e) = axum::serve(listener, app_routes).await {
        error!("Server error: {}", e);
    }
}
