//! Authentication data models

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::oauth::ExternalProfile;

/// Session credential claims.
///
/// `ver` must equal the user's current `session_version` for the credential
/// to verify; bumping the version revokes every outstanding credential.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub ver: i64,
    pub jti: String,
    pub typ: String,
}

/// Claims of a short-lived ticket that lets an authenticated user confirm an
/// ambiguous account link.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LinkTicketClaims {
    pub typ: String,
    pub iat: i64,
    pub exp: i64,
    pub profile: ExternalProfile,
}

/// User database model
#[derive(FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub last_seen_at: Option<String>,
}

/// One provider account linked to a user.
#[derive(FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct ExternalIdentity {
    pub id: String,
    pub user_id: String,
    pub provider: String,
    pub subject: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub linked_at: String,
    pub updated_at: String,
}

#[derive(Deserialize, Debug)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Debug)]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: String,
}

#[derive(Deserialize, Debug)]
pub struct ConfirmLinkRequest {
    pub ticket: String,
}

/// Linked identity as shown to its owner.
#[derive(Serialize, Debug, Clone)]
pub struct IdentityView {
    pub provider: String,
    pub subject: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub linked_at: String,
    pub updated_at: String,
}

impl From<ExternalIdentity> for IdentityView {
    fn from(identity: ExternalIdentity) -> Self {
        Self {
            provider: identity.provider,
            subject: identity.subject,
            email: identity.email,
            email_verified: identity.email_verified,
            name: identity.name,
            avatar: identity.avatar,
            linked_at: identity.linked_at,
            updated_at: identity.updated_at,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct UserProfile {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub created_at: String,
    pub last_seen_at: Option<String>,
    pub has_password: bool,
    pub identities: Vec<IdentityView>,
}

impl UserProfile {
    pub fn new(user: User, identities: Vec<ExternalIdentity>) -> Self {
        // Most recently refreshed provider avatar wins.
        let avatar = identities
            .iter()
            .filter(|i| i.avatar.is_some())
            .max_by(|a, b| a.updated_at.cmp(&b.updated_at))
            .and_then(|i| i.avatar.clone());
        let name = user.name.clone().or_else(|| {
            identities.iter().find_map(|i| i.name.clone())
        });

        Self {
            id: user.id,
            email: user.email,
            name,
            avatar,
            created_at: user.created_at,
            last_seen_at: user.last_seen_at,
            has_password: user.password_hash.is_some(),
            identities: identities.into_iter().map(IdentityView::from).collect(),
        }
    }
}

/// Body returned whenever a credential is issued.
#[derive(Serialize, Debug, Clone)]
pub struct SessionResponse {
    pub token: String,
    pub token_type: String,
    pub expires_at: String,
    pub user: UserProfile,
}
