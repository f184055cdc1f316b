//! Credential store: durable users and their linked provider identities.
//!
//! Every query is a free function generic over the executor so the account
//! resolver can run the same statements inside one transaction, while the
//! [`CredentialStore`] wrapper serves the single-statement paths from the pool.

use chrono::Utc;
use sqlx::{Executor, Sqlite, SqlitePool};
use thiserror::Error;

use super::models::{ExternalIdentity, User};
use crate::common::{generate_identity_id, generate_user_id};
use crate::oauth::ExternalProfile;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    EmailTaken,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// True when the error is a UNIQUE/PRIMARY KEY constraint violation.
pub fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

pub async fn user_by_id<'e, E>(exec: E, user_id: &str) -> Result<Option<User>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(exec)
        .await
}

/// `email` must already be normalized.
pub async fn user_by_email<'e, E>(exec: E, email: &str) -> Result<Option<User>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(exec)
        .await
}

pub async fn identity_by_key<'e, E>(
    exec: E,
    provider: &str,
    subject: &str,
) -> Result<Option<ExternalIdentity>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, ExternalIdentity>(
        "SELECT * FROM external_identities WHERE provider = ? AND subject = ?",
    )
    .bind(provider)
    .bind(subject)
    .fetch_optional(exec)
    .await
}

pub async fn identities_for_user<'e, E>(
    exec: E,
    user_id: &str,
) -> Result<Vec<ExternalIdentity>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, ExternalIdentity>(
        "SELECT * FROM external_identities WHERE user_id = ? ORDER BY linked_at ASC",
    )
    .bind(user_id)
    .fetch_all(exec)
    .await
}

/// Identities from providers other than `provider` whose cached, unverified
/// email equals `email`.
pub async fn unverified_email_claims<'e, E>(
    exec: E,
    email: &str,
    provider: &str,
) -> Result<Vec<ExternalIdentity>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, ExternalIdentity>(
        r#"
        SELECT * FROM external_identities
        WHERE email = ? AND email_verified = 0 AND provider != ?
        "#,
    )
    .bind(email)
    .bind(provider)
    .fetch_all(exec)
    .await
}

/// Insert a new user row and return its id.
pub async fn insert_user<'e, E>(
    exec: E,
    email: Option<&str>,
    name: Option<&str>,
    password_hash: Option<&str>,
) -> Result<String, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id = generate_user_id();
    let ts = now();
    sqlx::query(
        r#"
        INSERT INTO users (id, email, name, password_hash, session_version, created_at, updated_at, last_seen_at)
        VALUES (?, ?, ?, ?, 0, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(email)
    .bind(name)
    .bind(password_hash)
    .bind(&ts)
    .bind(&ts)
    .bind(&ts)
    .execute(exec)
    .await?;
    Ok(id)
}

/// Link `profile` to `user_id`. Fails with a unique violation if the
/// (provider, subject) pair is already linked anywhere.
pub async fn insert_identity<'e, E>(
    exec: E,
    user_id: &str,
    profile: &ExternalProfile,
    email: Option<&str>,
) -> Result<String, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id = generate_identity_id();
    let ts = now();
    sqlx::query(
        r#"
        INSERT INTO external_identities
            (id, user_id, provider, subject, email, email_verified, name, avatar, linked_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(profile.provider.as_str())
    .bind(&profile.subject)
    .bind(email)
    .bind(profile.email_verified)
    .bind(profile.name.as_deref())
    .bind(profile.avatar.as_deref())
    .bind(&ts)
    .bind(&ts)
    .execute(exec)
    .await?;
    Ok(id)
}

/// Overwrite the cached profile fields of an existing identity.
pub async fn refresh_identity_profile<'e, E>(
    exec: E,
    identity_id: &str,
    profile: &ExternalProfile,
    email: Option<&str>,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        UPDATE external_identities
        SET email = ?, email_verified = ?, name = ?, avatar = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(email)
    .bind(profile.email_verified)
    .bind(profile.name.as_deref())
    .bind(profile.avatar.as_deref())
    .bind(now())
    .bind(identity_id)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn set_user_email<'e, E>(exec: E, user_id: &str, email: &str) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE users SET email = ?, updated_at = ? WHERE id = ?")
        .bind(email)
        .bind(now())
        .bind(user_id)
        .execute(exec)
        .await?;
    Ok(())
}

pub async fn touch_last_seen<'e, E>(exec: E, user_id: &str) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE users SET last_seen_at = ? WHERE id = ?")
        .bind(now())
        .bind(user_id)
        .execute(exec)
        .await?;
    Ok(())
}

/// Pool-backed access for the single-statement paths.
#[derive(Clone, Debug)]
pub struct CredentialStore {
    db: SqlitePool,
}

impl CredentialStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn find_user(&self, user_id: &str) -> Result<Option<User>, sqlx::Error> {
        user_by_id(&self.db, user_id).await
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        user_by_email(&self.db, email).await
    }

    pub async fn identities(&self, user_id: &str) -> Result<Vec<ExternalIdentity>, sqlx::Error> {
        identities_for_user(&self.db, user_id).await
    }

    /// Create a password-based user. `email` must already be normalized.
    pub async fn create_password_user(
        &self,
        email: &str,
        name: Option<&str>,
        password_hash: &str,
    ) -> Result<String, StoreError> {
        match insert_user(&self.db, Some(email), name, Some(password_hash)).await {
            Ok(id) => Ok(id),
            Err(e) if is_unique_violation(&e) => Err(StoreError::EmailTaken),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    pub async fn set_password_hash(&self, user_id: &str, password_hash: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(now())
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Current session version, or `None` when the user does not exist.
    pub async fn session_version(&self, user_id: &str) -> Result<Option<i64>, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT session_version FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(|r| r.0))
    }

    /// Atomically increment the session version. Returns false for unknown users.
    pub async fn bump_session_version(&self, user_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET session_version = session_version + 1, updated_at = ? WHERE id = ?",
        )
        .bind(now())
        .bind(user_id)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
