//! Authentication handlers

use axum::extract::{Extension, Json};
use axum::http::{HeaderMap, StatusCode};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::extractors::{extract_credential, AuthedUser, MaybeAuthedUser, SESSION_COOKIE};
use super::models::{
    ChangePasswordRequest, ConfirmLinkRequest, LoginRequest, RegisterRequest, SessionResponse,
    UserProfile,
};
use super::password::{hash_password, verify_password};
use super::session::IssuedSession;
use super::store::StoreError;
use super::validators::{PasswordChangeValidator, RegisterValidator};
use crate::common::helpers::normalize_email;
use crate::common::{safe_email_log, ApiError, AppConfig, AppState, Validator};

// ---- Helper Functions ----

/// Cookie carrying `session`, lifetime matched to the credential.
pub fn session_cookie(config: &AppConfig, session: &IssuedSession) -> Cookie<'static> {
    let remaining = session.claims.exp - session.claims.iat;
    Cookie::build((SESSION_COOKIE, session.token.clone()))
        .path("/")
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(remaining))
        .build()
}

pub async fn load_profile(state: &AppState, user_id: &str) -> Result<UserProfile, ApiError> {
    let user = state
        .store
        .find_user(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".to_string()))?;
    let identities = state.store.identities(user_id).await?;
    Ok(UserProfile::new(user, identities))
}

/// Issue a credential for `user_id` and build the response body sent with it.
pub async fn start_session(
    state: &AppState,
    user_id: &str,
) -> Result<(IssuedSession, SessionResponse), ApiError> {
    let session = state.sessions.issue(user_id).await?;
    let user = load_profile(state, user_id).await?;

    let body = SessionResponse {
        token: session.token.clone(),
        token_type: "Bearer".to_string(),
        expires_at: session.expires_at().to_rfc3339(),
        user,
    };
    Ok((session, body))
}

// ---- Email / password ----

/// POST /auth/email/register
///
/// # Request Body
/// ```json
/// { "email": "bob@example.com", "password": "hunter2", "name": "Bob" }
/// ```
///
/// Responds 201 with `{token, token_type, expires_at, user}` and sets the
/// session cookie. 409 when the email is already registered.
pub async fn register(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    jar: CookieJar,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<SessionResponse>), ApiError> {
    let state = state_lock.read().await.clone();

    let validation = RegisterValidator.validate(&payload);
    if !validation.is_valid {
        return Err(validation.into());
    }

    let email = normalize_email(&payload.email);
    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());
    let password_hash = hash_password(&payload.password)?;

    let user_id = match state
        .store
        .create_password_user(&email, name, &password_hash)
        .await
    {
        Ok(id) => id,
        Err(StoreError::EmailTaken) => {
            info!(email = %safe_email_log(&email), "Registration refused: email already registered");
            return Err(ApiError::Conflict("email already registered".to_string()));
        }
        Err(StoreError::Database(e)) => {
            error!(error = %e, email = %safe_email_log(&email), "Database error during registration");
            return Err(ApiError::DatabaseError(e));
        }
    };

    let (session, body) = start_session(&state, &user_id).await?;
    info!(user_id = %user_id, email = %safe_email_log(&email), "User registered with email and password");

    let jar = jar.add(session_cookie(&state.config, &session));
    Ok((StatusCode::CREATED, jar, Json(body)))
}

/// POST /auth/email/login
///
/// Unknown email and wrong password produce the same 401.
pub async fn login(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), ApiError> {
    let state = state_lock.read().await.clone();
    let email = normalize_email(&payload.email);

    let user = state.store.find_user_by_email(&email).await?;
    let user = match user {
        Some(u) => u,
        None => {
            warn!(email = %safe_email_log(&email), "Login failed: unknown email");
            return Err(ApiError::InvalidLogin);
        }
    };

    let verified = user
        .password_hash
        .as_deref()
        .map(|hash| verify_password(&payload.password, hash))
        .unwrap_or(false);
    if !verified {
        warn!(user_id = %user.id, "Login failed: password mismatch");
        return Err(ApiError::InvalidLogin);
    }

    let resolved = state.resolver.resolve_password(&user.id).await?;
    let (session, body) = start_session(&state, &resolved.user_id).await?;
    info!(user_id = %resolved.user_id, "User logged in with email and password");

    Ok((jar.add(session_cookie(&state.config, &session)), Json(body)))
}

/// POST /auth/email/password
///
/// Set a first password, or change it given the current one. Every other
/// session is revoked and a fresh credential is returned.
pub async fn change_password(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    jar: CookieJar,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), ApiError> {
    let state = state_lock.read().await.clone();

    let validation = PasswordChangeValidator.validate(&payload);
    if !validation.is_valid {
        return Err(validation.into());
    }

    let user = state
        .store
        .find_user(&authed.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".to_string()))?;

    if let Some(existing) = user.password_hash.as_deref() {
        let current = payload.current_password.as_deref().unwrap_or_default();
        if !verify_password(current, existing) {
            warn!(user_id = %user.id, "Password change refused: current password mismatch");
            return Err(ApiError::InvalidLogin);
        }
    }

    let password_hash = hash_password(&payload.new_password)?;
    state.store.set_password_hash(&user.id, &password_hash).await?;
    state.sessions.invalidate(&user.id).await?;

    let (session, body) = start_session(&state, &user.id).await?;
    info!(user_id = %user.id, "Password updated, previous sessions revoked");

    Ok((jar.add(session_cookie(&state.config, &session)), Json(body)))
}

// ---- Session ----

/// GET /auth/me
pub async fn me(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
) -> Result<Json<UserProfile>, ApiError> {
    let state = state_lock.read().await.clone();
    let profile = load_profile(&state, &authed.id).await?;
    Ok(Json(profile))
}

/// POST /auth/refresh
///
/// Trades a valid credential for a new one with a fresh, fixed expiry.
pub async fn refresh(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, Json<SessionResponse>), ApiError> {
    let state = state_lock.read().await.clone();

    let token = extract_credential(&headers)
        .ok_or_else(|| ApiError::Unauthorized("missing auth".into()))?;
    let session = state.sessions.refresh(&token).await?;
    let user = load_profile(&state, &session.claims.sub).await?;
    debug!(user_id = %session.claims.sub, "Session refreshed");

    let body = SessionResponse {
        token: session.token.clone(),
        token_type: "Bearer".to_string(),
        expires_at: session.expires_at().to_rfc3339(),
        user,
    };
    Ok((jar.add(session_cookie(&state.config, &session)), Json(body)))
}

/// GET /auth/logout
///
/// Revokes every session of the presenting user when the credential verifies.
/// Always answers 200 and clears the cookie.
pub async fn logout(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> (CookieJar, Json<serde_json::Value>) {
    let state = state_lock.read().await.clone();

    if let Some(token) = extract_credential(&headers) {
        match state.sessions.verify(&token).await {
            Ok(claims) => match state.sessions.invalidate(&claims.sub).await {
                Ok(()) => info!(user_id = %claims.sub, "User logged out, sessions revoked"),
                Err(e) => error!(error = %e, user_id = %claims.sub, "Failed to revoke sessions on logout"),
            },
            Err(e) => debug!(error = %e, "Logout with a credential that no longer verifies"),
        }
    }

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Json(serde_json::json!({ "message": "Logout successful" })))
}

// ---- Linking ----

/// POST /auth/link/confirm
///
/// # Request Body
/// ```json
/// { "ticket": "<link ticket from an AMBIGUOUS_IDENTITY response>" }
/// ```
pub async fn confirm_link(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    MaybeAuthedUser(authed): MaybeAuthedUser,
    jar: CookieJar,
    Json(payload): Json<ConfirmLinkRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), ApiError> {
    let state = state_lock.read().await.clone();

    let profile = state.sessions.open_link_ticket(&payload.ticket)?;
    let caller = authed.as_ref().map(|a| a.id.as_str());
    let resolved = state.resolver.confirm_link(caller, &profile).await?;

    let (session, body) = start_session(&state, &resolved.user_id).await?;
    info!(
        user_id = %resolved.user_id,
        provider = %profile.provider,
        outcome = resolved.resolution.as_str(),
        "Link ticket redeemed"
    );

    Ok((jar.add(session_cookie(&state.config, &session)), Json(body)))
}
