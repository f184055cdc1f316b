//! Single-use OAuth `state` tokens.
//!
//! A token is redeemed with `DELETE ... RETURNING`, so of two callbacks racing
//! on the same token exactly one sees the row. Expired rows are kept for one
//! extra TTL before purging, which lets a late callback still be reported as
//! stale rather than unknown.

use chrono::{Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use sqlx::SqlitePool;
use tracing::debug;

use super::provider::ProviderKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateCheck {
    Accepted,
    /// Never issued, already consumed, or purged.
    Unknown,
    Expired,
    /// Issued for a different provider's login.
    WrongProvider,
}

#[derive(Clone, Debug)]
pub struct OAuthStateStore {
    db: SqlitePool,
    ttl: Duration,
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl OAuthStateStore {
    pub fn new(db: SqlitePool, ttl: Duration) -> Self {
        Self { db, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn issue(&self, provider: ProviderKind) -> Result<String, sqlx::Error> {
        self.issue_at(provider, Utc::now().timestamp()).await
    }

    pub async fn issue_at(&self, provider: ProviderKind, now: i64) -> Result<String, sqlx::Error> {
        let state = random_token();
        sqlx::query(
            "INSERT INTO oauth_states (state, provider, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&state)
        .bind(provider.as_str())
        .bind(now)
        .bind(now + self.ttl.num_seconds())
        .execute(&self.db)
        .await?;
        Ok(state)
    }

    /// Redeem `state` for `provider`. The row is gone afterwards whatever the outcome.
    pub async fn consume(
        &self,
        state: &str,
        provider: ProviderKind,
        now: i64,
    ) -> Result<StateCheck, sqlx::Error> {
        let row: Option<(String, i64)> =
            sqlx::query_as("DELETE FROM oauth_states WHERE state = ? RETURNING provider, expires_at")
                .bind(state)
                .fetch_optional(&self.db)
                .await?;

        let check = match row {
            None => StateCheck::Unknown,
            Some((issued_for, _)) if issued_for != provider.as_str() => StateCheck::WrongProvider,
            Some((_, expires_at)) if now >= expires_at => StateCheck::Expired,
            Some(_) => StateCheck::Accepted,
        };
        debug!(provider = %provider, outcome = ?check, "OAuth state consumed");
        Ok(check)
    }

    /// Delete rows that expired more than one TTL before `now`.
    pub async fn purge_expired(&self, now: i64) -> Result<u64, sqlx::Error> {
        let cutoff = now - self.ttl.num_seconds();
        let result = sqlx::query("DELETE FROM oauth_states WHERE expires_at <= ?")
            .bind(cutoff)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}
