//! Sponsorship routes

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers;

/// Creates and returns the sponsorship router
///
/// # Routes
/// - `POST /sponsors/webhook` - Signed payment processor callback
/// - `GET /sponsors/my-sponsorships` - Caller's sponsorship and its history
pub fn sponsors_routes() -> Router {
    Router::new()
        .route("/sponsors/webhook", post(handlers::webhook))
        .route("/sponsors/my-sponsorships", get(handlers::my_sponsorships))
}
