//! OAuth routes

use axum::{routing::get, Router};

use super::handlers;

/// Creates and returns the OAuth router
///
/// # Routes
/// - `GET /auth/providers` - Providers configured on this deployment
/// - `GET /auth/:provider/login` - Redirect to the provider's consent page
/// - `GET /auth/:provider/callback` - Complete the OAuth flow
pub fn oauth_routes() -> Router {
    Router::new()
        .route("/auth/providers", get(handlers::list_providers))
        .route("/auth/:provider/login", get(handlers::login))
        .route("/auth/:provider/callback", get(handlers::callback))
}
