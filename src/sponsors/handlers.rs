//! Sponsorship handlers

use axum::body::Bytes;
use axum::extract::{Extension, Json};
use axum::http::HeaderMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, warn};

use super::models::{MySponsorshipsResponse, WebhookResponse};
use super::reconciler::ReconcileError;
use super::signature::SIGNATURE_HEADER;
use crate::auth::AuthedUser;
use crate::common::{ApiError, AppState};

/// POST /sponsors/webhook
///
/// Payment processor callback. The raw body is authenticated with
/// `X-Signature-256: sha256=<hex>`.
///
/// Every well-formed delivery is answered 200 so the processor stops
/// retrying; the body says what happened:
/// ```json
/// { "status": "applied" }
/// { "status": "duplicate" }
/// { "status": "rejected", "reason": "invalid_signature" }
/// ```
/// A body that is not a payment event answers 400.
pub async fn webhook(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let state = state_lock.read().await.clone();
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    match state.ledger.receive(&body, signature).await {
        Ok(outcome) => Ok(Json(outcome.into())),
        Err(ReconcileError::Malformed(msg)) => {
            warn!(error = %msg, "Malformed payment webhook");
            Err(ApiError::BadRequest(msg))
        }
        Err(e) => {
            error!(error = %e, "Failed to apply payment webhook");
            Err(e.into())
        }
    }
}

/// GET /sponsors/my-sponsorships
///
/// Current sponsorship of the caller (null when none) and every event
/// applied to it, oldest first.
pub async fn my_sponsorships(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    user: AuthedUser,
) -> Result<Json<MySponsorshipsResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    let (sponsorship, events) = state.ledger.ledger_for(&user.id).await.map_err(|e| {
        error!(error = %e, user_id = %user.id, "Failed to load sponsorship ledger");
        ApiError::DatabaseError(e)
    })?;

    Ok(Json(MySponsorshipsResponse {
        sponsorship,
        events,
    }))
}
