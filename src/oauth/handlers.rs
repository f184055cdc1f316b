//! OAuth login and callback handlers

use axum::extract::{Extension, Json, Path, Query};
use axum::http::{header::LOCATION, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::flow::{CallbackParams, FailureReason, FlowFailure};
use super::provider::ProviderKind;
use crate::auth::handlers::{session_cookie, start_session};
use crate::common::{ApiError, AppState};

fn parse_provider(raw: &str) -> Result<ProviderKind, ApiError> {
    raw.parse::<ProviderKind>().map_err(|_| {
        warn!(provider = %raw, "Unknown OAuth provider requested");
        ApiError::NotFound(format!("unknown provider: {}", raw))
    })
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

/// GET /auth/providers
pub async fn list_providers(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
) -> Json<serde_json::Value> {
    let state = state_lock.read().await.clone();
    let configured: Vec<&str> = state
        .oauth
        .providers()
        .configured()
        .into_iter()
        .map(|kind| kind.as_str())
        .collect();
    Json(serde_json::json!({ "providers": configured }))
}

/// GET /auth/:provider/login
///
/// Issues a single-use state token and redirects (302) to the provider.
pub async fn login(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Path(provider): Path<String>,
) -> Result<Response, ApiError> {
    let state = state_lock.read().await.clone();
    let provider = parse_provider(&provider)?;

    let url = state.oauth.begin(provider).await.map_err(|reason| {
        if reason == FailureReason::NotConfigured {
            error!(provider = %provider, "Login attempted for an unconfigured provider");
        }
        ApiError::from(reason)
    })?;

    Ok(found(&url))
}

/// GET /auth/:provider/callback
///
/// Success sets the session cookie and either answers 200 with the session
/// body or, when `LOGIN_REDIRECT_URL` is set, redirects there with the token.
/// An ambiguous identity answers 409 with a link ticket.
pub async fn callback(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let state = state_lock.read().await.clone();
    let provider = parse_provider(&provider)?;

    let success = match state.oauth.complete(provider, params).await {
        Ok(success) => success,
        Err(failure) => return Err(failure_response(&state, failure)),
    };

    let (session, body) = start_session(&state, &success.resolved.user_id).await?;
    let jar = jar.add(session_cookie(&state.config, &session));
    info!(
        user_id = %success.resolved.user_id,
        provider = %provider,
        "User authentication successful via OAuth"
    );

    match &state.config.login_redirect_url {
        Some(target) => {
            let separator = if target.contains('?') { '&' } else { '?' };
            let location = format!("{}{}token={}", target, separator, urlencoding::encode(&session.token));
            Ok((jar, found(&location)).into_response())
        }
        None => Ok((jar, Json(body)).into_response()),
    }
}

fn failure_response(state: &AppState, failure: FlowFailure) -> ApiError {
    match (failure.reason, failure.profile) {
        (FailureReason::AmbiguousIdentity(message), Some(profile)) => {
            let link_ticket = match state.sessions.mint_link_ticket(&profile) {
                Ok(ticket) => Some(ticket),
                Err(e) => {
                    error!(error = %e, provider = %profile.provider, "Failed to mint link ticket");
                    None
                }
            };
            ApiError::AmbiguousIdentity {
                message,
                link_ticket,
            }
        }
        (reason, _) => reason.into(),
    }
}
