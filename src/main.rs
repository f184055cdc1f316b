// src/main.rs
use axum::{extract::Extension, middleware, Router};
use chrono::Utc;
use dotenv::dotenv;
use reqwest::Client;
use sqlx::sqlite::SqlitePoolOptions;
use std::path::PathBuf;
use std::time::Duration;
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

// ============================================================================
// MODULE IMPORTS
// ============================================================================

mod auth;
mod common;
mod logging_middleware;
mod monitoring;
mod oauth;
mod sponsors;

// ============================================================================
// COMMON IMPORTS
// ============================================================================

use common::{AppConfig, AppState};
use oauth::{OAuthStateStore, ProviderRegistry};
use oauth::provider::CLIENT_USER_AGENT;

/// How often expired OAuth state rows are swept.
const STATE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

// ============================================================================
// MAIN APPLICATION ENTRY POINT
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // ========================================================================
    // ENVIRONMENT CONFIGURATION
    // ========================================================================

    let config = AppConfig::from_env();
    let _sentry = monitoring::init(&config);
    config.warn_on_insecure_defaults();

    // ========================================================================
    // DATABASE SETUP
    // ========================================================================

    if let Some(path_part) = config.database_url.strip_prefix("sqlite://") {
        let path_without_params = path_part.split('?').next().unwrap_or("");
        if !path_without_params.is_empty() && !path_without_params.starts_with(':') {
            let db_path = PathBuf::from(path_without_params);
            if let Some(parent) = db_path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
        }
    }

    let connect_options = common::db::connect_options(&config.database_url)?;
    let pool = SqlitePoolOptions::new()
        .connect_with(connect_options)
        .await?;

    // Run database migrations
    common::migrations::run_migrations(&pool).await?;

    // ========================================================================
    // SERVICE INITIALIZATION
    // ========================================================================

    let http_client = Client::builder()
        .user_agent(CLIENT_USER_AGENT)
        .timeout(config.provider_timeout)
        .build()?;

    let providers = ProviderRegistry::from_config(&config, &http_client);
    info!(providers = ?providers.configured(), "OAuth providers registered");

    spawn_state_purge(OAuthStateStore::new(pool.clone(), config.oauth_state_ttl));
    info!("OAuth state purge task started");

    // ========================================================================
    // APPLICATION STATE
    // ========================================================================

    let port = config.port;
    let cors = cors_layer(&config.cors_origins);
    let app_state = AppState::new(pool, config, providers);
    let shared = Arc::new(RwLock::new(app_state));

    // ========================================================================
    // ROUTER COMPOSITION
    // ========================================================================

    let app = Router::new()
        // ====================================================================
        // AUTHENTICATION ROUTES (Email/password, sessions, linking)
        // ====================================================================
        .merge(auth::auth_routes())
        // ====================================================================
        // OAUTH ROUTES (GitHub, Google, LinkedIn)
        // ====================================================================
        .merge(oauth::oauth_routes())
        // ====================================================================
        // SPONSORSHIP ROUTES (Webhook, ledger)
        // ====================================================================
        .merge(sponsors::sponsors_routes())
        // ====================================================================
        // MIDDLEWARE AND LAYERS
        // ====================================================================
        // Add request/response body logging in debug mode
        .layer(middleware::from_fn(logging_middleware::log_request_response))
        .layer(Extension(shared))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // ========================================================================
    // SERVER STARTUP
    // ========================================================================

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn cors_layer(cors_origins: &[String]) -> CorsLayer {
    let origins: Vec<axum::http::HeaderValue> = cors_origins
        .iter()
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::HeaderName::from_static("x-request-id"),
        ])
        .allow_credentials(true)
}

fn spawn_state_purge(states: OAuthStateStore) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATE_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match states.purge_expired(Utc::now().timestamp()).await {
                Ok(0) => {}
                Ok(purged) => debug!(purged, "Purged expired OAuth states"),
                Err(e) => warn!(error = %e, "Failed to purge expired OAuth states"),
            }
        }
    });
}
