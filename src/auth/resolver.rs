//! Account resolver
//!
//! Decides, for every successful authentication, which canonical user it
//! belongs to. Provider identities resolve in order:
//!
//! 1. an identity already linked for (provider, subject) returns its owner;
//! 2. a verified email matching an existing user links a new identity to it;
//! 3. anything else creates a user together with the identity.
//!
//! Each resolution runs in one transaction that holds the database write
//! lock, so concurrent first logins for the same identity or email queue up
//! and the later one finds the earlier one's rows. A unique violation that
//! still slips through is retried once.

use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::store::{self, is_unique_violation};
use crate::common::db;
use crate::common::helpers::normalize_email;
use crate::common::{safe_email_log, ApiError};
use crate::oauth::ExternalProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The identity was already linked.
    Existing,
    /// A new identity was attached to an existing user.
    Linked,
    /// A new user was created.
    Created,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Existing => "existing",
            Resolution::Linked => "linked",
            Resolution::Created => "created",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub user_id: String,
    pub resolution: Resolution,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("ambiguous identity: {reason}")]
    Ambiguous { reason: String },

    #[error("identity is linked to another account")]
    IdentityOwnedElsewhere,

    #[error("linking a new identity requires a signed-in account")]
    SessionRequired,

    #[error("user not found")]
    UserNotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Ambiguous { reason } => ApiError::AmbiguousIdentity {
                message: reason,
                link_ticket: None,
            },
            ResolveError::IdentityOwnedElsewhere => {
                ApiError::Conflict("identity is linked to another account".to_string())
            }
            ResolveError::SessionRequired => {
                ApiError::Unauthorized("sign in to confirm this link".to_string())
            }
            ResolveError::UserNotFound => ApiError::NotFound("user not found".to_string()),
            ResolveError::Database(e) => ApiError::DatabaseError(e),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AccountResolver {
    db: SqlitePool,
}

impl AccountResolver {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Resolve a normalized provider profile to exactly one user.
    pub async fn resolve_external(&self, profile: &ExternalProfile) -> Result<Resolved, ResolveError> {
        match self.try_resolve_external(profile).await {
            Err(ResolveError::Database(e)) if is_unique_violation(&e) => {
                debug!(
                    provider = %profile.provider,
                    subject = %profile.subject,
                    "Concurrent resolution detected, retrying"
                );
                self.try_resolve_external(profile).await
            }
            other => other,
        }
    }

    async fn try_resolve_external(&self, profile: &ExternalProfile) -> Result<Resolved, ResolveError> {
        let provider = profile.provider.as_str();
        let email = profile
            .email
            .as_deref()
            .map(normalize_email)
            .filter(|e| !e.is_empty());

        let mut tx = db::begin_write(&self.db).await?;

        if let Some(identity) = store::identity_by_key(&mut *tx, provider, &profile.subject).await? {
            let user = store::user_by_id(&mut *tx, &identity.user_id)
                .await?
                .ok_or(ResolveError::UserNotFound)?;

            if let (true, Some(incoming)) = (profile.email_verified, email.as_deref()) {
                // An email already cached on the identity was accepted at login or link time.
                let unchanged = identity.email.as_deref() == Some(incoming);
                match user.email.as_deref() {
                    Some(stored) if stored != incoming && !unchanged => {
                        warn!(
                            user_id = %user.id,
                            provider = %provider,
                            email = %safe_email_log(incoming),
                            "Provider reports a verified email different from the account email"
                        );
                        return Err(ResolveError::Ambiguous {
                            reason: format!(
                                "{} reports a verified email that differs from this account's email",
                                provider
                            ),
                        });
                    }
                    None => {
                        if store::user_by_email(&mut *tx, incoming).await?.is_none() {
                            store::set_user_email(&mut *tx, &user.id, incoming).await?;
                        }
                    }
                    _ => {}
                }
            }

            store::refresh_identity_profile(&mut *tx, &identity.id, profile, email.as_deref()).await?;
            store::touch_last_seen(&mut *tx, &user.id).await?;
            tx.commit().await?;

            return Ok(Resolved {
                user_id: user.id,
                resolution: Resolution::Existing,
            });
        }

        if let Some(incoming) = email.as_deref() {
            if let Some(owner) = store::user_by_email(&mut *tx, incoming).await? {
                let foreign_claims = store::unverified_email_claims(&mut *tx, incoming, provider)
                    .await?
                    .into_iter()
                    .filter(|claim| claim.user_id != owner.id)
                    .count();

                if foreign_claims > 0 {
                    warn!(
                        provider = %provider,
                        email = %safe_email_log(incoming),
                        "Email is also claimed unverified by another provider account"
                    );
                    return Err(ResolveError::Ambiguous {
                        reason: "this email is also claimed, unverified, by another provider account"
                            .to_string(),
                    });
                }

                if !profile.email_verified {
                    warn!(
                        user_id = %owner.id,
                        provider = %provider,
                        email = %safe_email_log(incoming),
                        "Unverified provider email matches an existing account"
                    );
                    return Err(ResolveError::Ambiguous {
                        reason: format!(
                            "{} did not verify this email, which belongs to an existing account",
                            provider
                        ),
                    });
                }

                store::insert_identity(&mut *tx, &owner.id, profile, Some(incoming)).await?;
                store::touch_last_seen(&mut *tx, &owner.id).await?;
                tx.commit().await?;

                info!(
                    user_id = %owner.id,
                    provider = %provider,
                    email = %safe_email_log(incoming),
                    "Linked provider identity to existing account by verified email"
                );
                return Ok(Resolved {
                    user_id: owner.id,
                    resolution: Resolution::Linked,
                });
            }
        }

        let user_email = email.as_deref().filter(|_| profile.email_verified);
        let user_id = store::insert_user(&mut *tx, user_email, profile.name.as_deref(), None).await?;
        store::insert_identity(&mut *tx, &user_id, profile, email.as_deref()).await?;
        tx.commit().await?;

        info!(
            user_id = %user_id,
            provider = %provider,
            has_email = user_email.is_some(),
            "Created new account from provider identity"
        );
        Ok(Resolved {
            user_id,
            resolution: Resolution::Created,
        })
    }

    /// A verified password login resolves to its own user.
    pub async fn resolve_password(&self, user_id: &str) -> Result<Resolved, ResolveError> {
        store::touch_last_seen(&self.db, user_id).await?;
        Ok(Resolved {
            user_id: user_id.to_string(),
            resolution: Resolution::Existing,
        })
    }

    /// Explicitly confirm a link that automatic resolution refused.
    ///
    /// With a signed-in `caller` the identity is attached to the caller. Without
    /// one, only an identity that is already linked can be confirmed; that
    /// refreshes its cached profile and keeps the account email as it is.
    pub async fn confirm_link(
        &self,
        caller: Option<&str>,
        profile: &ExternalProfile,
    ) -> Result<Resolved, ResolveError> {
        let provider = profile.provider.as_str();
        let email = profile
            .email
            .as_deref()
            .map(normalize_email)
            .filter(|e| !e.is_empty());

        let mut tx = db::begin_write(&self.db).await?;
        let existing = store::identity_by_key(&mut *tx, provider, &profile.subject).await?;

        let (user_id, resolution) = match (existing, caller) {
            (Some(identity), Some(caller)) if identity.user_id != caller => {
                warn!(
                    user_id = %caller,
                    provider = %provider,
                    subject = %profile.subject,
                    "Refusing to reassign an identity linked to another account"
                );
                return Err(ResolveError::IdentityOwnedElsewhere);
            }
            (Some(identity), _) => {
                store::refresh_identity_profile(&mut *tx, &identity.id, profile, email.as_deref())
                    .await?;
                (identity.user_id, Resolution::Existing)
            }
            (None, Some(caller)) => {
                if store::user_by_id(&mut *tx, caller).await?.is_none() {
                    return Err(ResolveError::UserNotFound);
                }
                match store::insert_identity(&mut *tx, caller, profile, email.as_deref()).await {
                    Ok(_) => {}
                    Err(e) if is_unique_violation(&e) => {
                        return Err(ResolveError::IdentityOwnedElsewhere)
                    }
                    Err(e) => return Err(e.into()),
                }
                (caller.to_string(), Resolution::Linked)
            }
            (None, None) => return Err(ResolveError::SessionRequired),
        };

        if let (true, Some(incoming)) = (profile.email_verified, email.as_deref()) {
            let user = store::user_by_id(&mut *tx, &user_id)
                .await?
                .ok_or(ResolveError::UserNotFound)?;
            if user.email.is_none() && store::user_by_email(&mut *tx, incoming).await?.is_none() {
                store::set_user_email(&mut *tx, &user_id, incoming).await?;
            }
        }

        store::touch_last_seen(&mut *tx, &user_id).await?;
        tx.commit().await?;

        info!(
            user_id = %user_id,
            provider = %provider,
            outcome = resolution.as_str(),
            "Identity link confirmed"
        );
        Ok(Resolved { user_id, resolution })
    }
}
