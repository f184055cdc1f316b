//! Authentication extractors for Axum

use async_trait::async_trait;
use axum::{
    extract::{Extension, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::common::{ApiError, AppState};

/// Name of the cookie carrying the session credential.
pub const SESSION_COOKIE: &str = "session";

/// Pull the presented credential from `Authorization: Bearer` or, failing
/// that, the session cookie.
pub fn extract_credential(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.strip_prefix("Bearer ").unwrap_or(s).trim().to_string())
        .filter(|s| !s.is_empty());

    bearer.or_else(|| {
        CookieJar::from_headers(headers)
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Authenticated user extractor
///
/// Verifies the presented credential against the session issuer, so expired,
/// revoked and tampered credentials are rejected with distinct errors.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub id: String,
}

async fn app_state<S: Send + Sync>(parts: &mut Parts, state: &S) -> Result<AppState, ApiError> {
    let Extension(state_lock): Extension<Arc<RwLock<AppState>>> =
        Extension::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::InternalServer("missing app state".to_string()))?;
    let app_state = state_lock.read().await.clone();
    Ok(app_state)
}

async fn authenticate(app_state: &AppState, token: &str) -> Result<AuthedUser, ApiError> {
    match app_state.sessions.verify(token).await {
        Ok(claims) => {
            debug!(user_id = %claims.sub, "User authentication successful via extractor");
            Ok(AuthedUser { id: claims.sub })
        }
        Err(e) => {
            warn!(error = %e, "Credential verification failed");
            Err(e.into())
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = app_state(parts, state).await?;

        let token = match extract_credential(&parts.headers) {
            Some(t) => t,
            None => {
                warn!("Authentication failed: no credential presented");
                return Err(ApiError::Unauthorized("missing auth".into()));
            }
        };

        authenticate(&app_state, &token).await
    }
}

/// Like [`AuthedUser`], but a request without any credential is let through as
/// `None`. A credential that is present must still verify.
#[derive(Debug, Clone)]
pub struct MaybeAuthedUser(pub Option<AuthedUser>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuthedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = app_state(parts, state).await?;

        match extract_credential(&parts.headers) {
            Some(token) => Ok(MaybeAuthedUser(Some(authenticate(&app_state, &token).await?))),
            None => Ok(MaybeAuthedUser(None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header::COOKIE, HeaderValue};

    #[test]
    fn test_bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        headers.insert(COOKIE, HeaderValue::from_static("session=cookie-token"));

        assert_eq!(extract_credential(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_cookie_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; session=cookie-token"));

        assert_eq!(extract_credential(&headers).as_deref(), Some("cookie-token"));
    }

    #[test]
    fn test_no_credential() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_credential(&headers), None);
        assert_eq!(extract_credential(&HeaderMap::new()), None);
    }
}
