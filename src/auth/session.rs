//! Session issuer
//!
//! Credentials are HS256 JWTs carrying the user's `session_version` at issue
//! time. Verification checks the signature, the `[iat, exp)` window and the
//! version currently stored for the user, so [`SessionIssuer::invalidate`]
//! revokes every outstanding credential immediately.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::models::{Claims, LinkTicketClaims};
use super::store::CredentialStore;
use crate::common::ApiError;
use crate::oauth::ExternalProfile;

pub const SESSION_TOKEN_TYPE: &str = "session";
pub const LINK_TICKET_TYPE: &str = "link";
pub const LINK_TICKET_TTL_MINUTES: i64 = 10;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("credential is malformed or its signature does not verify")]
    Invalid,

    #[error("credential has expired")]
    Expired,

    #[error("credential has been revoked")]
    Revoked,

    #[error("no such user")]
    UnknownUser,

    #[error("failed to sign credential: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Invalid => ApiError::InvalidCredential,
            SessionError::Expired => ApiError::ExpiredCredential,
            SessionError::Revoked => ApiError::RevokedCredential,
            SessionError::UnknownUser => ApiError::Unauthorized("user not found".to_string()),
            SessionError::Signing(e) => {
                error!(error = %e, "JWT encoding error");
                ApiError::InternalServer("jwt error".to_string())
            }
            SessionError::Database(e) => ApiError::DatabaseError(e),
        }
    }
}

/// A freshly signed credential.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub claims: Claims,
}

impl IssuedSession {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.claims.exp, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

pub struct SessionIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
    store: CredentialStore,
}

impl SessionIssuer {
    pub fn new(secret: &str, ttl: Duration, store: CredentialStore) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
            store,
        }
    }

    // Expiry is checked by hand so that "expired" and "not yet valid" can be
    // told apart from a bad signature.
    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation
    }

    /// Sign a credential for `user_id` valid for the configured TTL.
    pub async fn issue(&self, user_id: &str) -> Result<IssuedSession, SessionError> {
        let version = self
            .store
            .session_version(user_id)
            .await?
            .ok_or(SessionError::UnknownUser)?;

        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now,
            exp: now + self.ttl.num_seconds(),
            ver: version,
            jti: Uuid::new_v4().to_string(),
            typ: SESSION_TOKEN_TYPE.to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        debug!(user_id = %user_id, version = version, "Session credential issued");

        Ok(IssuedSession { token, claims })
    }

    pub async fn verify(&self, token: &str) -> Result<Claims, SessionError> {
        self.verify_at(token, Utc::now().timestamp()).await
    }

    /// Verify `token` as of the unix instant `now`.
    pub async fn verify_at(&self, token: &str, now: i64) -> Result<Claims, SessionError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &Self::validation())
            .map_err(|e| {
                debug!(error = %e, "Credential failed to decode");
                SessionError::Invalid
            })?
            .claims;

        if claims.typ != SESSION_TOKEN_TYPE || claims.iat > now {
            return Err(SessionError::Invalid);
        }
        if now >= claims.exp {
            return Err(SessionError::Expired);
        }

        match self.store.session_version(&claims.sub).await? {
            Some(current) if current == claims.ver => Ok(claims),
            Some(current) => {
                debug!(
                    user_id = %claims.sub,
                    presented = claims.ver,
                    current = current,
                    "Credential version is stale"
                );
                Err(SessionError::Revoked)
            }
            None => {
                warn!(user_id = %claims.sub, "Credential refers to a user that no longer exists");
                Err(SessionError::Revoked)
            }
        }
    }

    /// Revoke every credential issued to `user_id` so far.
    pub async fn invalidate(&self, user_id: &str) -> Result<(), SessionError> {
        if self.store.bump_session_version(user_id).await? {
            debug!(user_id = %user_id, "Session version bumped");
            Ok(())
        } else {
            Err(SessionError::UnknownUser)
        }
    }

    /// Trade a still-valid credential for one with a fresh fixed expiry.
    pub async fn refresh(&self, token: &str) -> Result<IssuedSession, SessionError> {
        let claims = self.verify(token).await?;
        self.issue(&claims.sub).await
    }

    /// Sign a short-lived ticket carrying a profile whose link awaits confirmation.
    pub fn mint_link_ticket(&self, profile: &ExternalProfile) -> Result<String, SessionError> {
        let now = Utc::now().timestamp();
        let claims = LinkTicketClaims {
            typ: LINK_TICKET_TYPE.to_string(),
            iat: now,
            exp: now + Duration::minutes(LINK_TICKET_TTL_MINUTES).num_seconds(),
            profile: profile.clone(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    pub fn open_link_ticket(&self, ticket: &str) -> Result<ExternalProfile, SessionError> {
        self.open_link_ticket_at(ticket, Utc::now().timestamp())
    }

    pub fn open_link_ticket_at(&self, ticket: &str, now: i64) -> Result<ExternalProfile, SessionError> {
        let claims = decode::<LinkTicketClaims>(ticket, &self.decoding_key, &Self::validation())
            .map_err(|_| SessionError::Invalid)?
            .claims;

        if claims.typ != LINK_TICKET_TYPE || claims.iat > now {
            return Err(SessionError::Invalid);
        }
        if now >= claims.exp {
            return Err(SessionError::Expired);
        }
        Ok(claims.profile)
    }
}
