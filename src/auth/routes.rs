//! Authentication routes

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers;

/// Creates and returns the authentication router
///
/// # Routes
/// - `POST /auth/email/register` - Create a password account
/// - `POST /auth/email/login` - Email/password login
/// - `POST /auth/email/password` - Set or change password
/// - `GET /auth/me` - Current user profile
/// - `POST /auth/refresh` - Exchange a valid credential for a fresh one
/// - `GET /auth/logout` - Revoke sessions and clear the cookie
/// - `POST /auth/link/confirm` - Redeem a link ticket
pub fn auth_routes() -> Router {
    Router::new()
        .route("/auth/email/register", post(handlers::register))
        .route("/auth/email/login", post(handlers::login))
        .route("/auth/email/password", post(handlers::change_password))
        .route("/auth/me", get(handlers::me))
        .route("/auth/refresh", post(handlers::refresh))
        .route("/auth/logout", get(handlers::logout))
        .route("/auth/link/confirm", post(handlers::confirm_link))
}
