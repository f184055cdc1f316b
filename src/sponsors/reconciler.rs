//! Sponsorship ledger reconciler
//!
//! Each delivery is RECEIVED, then either VALIDATED and APPLIED inside one
//! transaction, or REJECTED with a reason. The event id is the primary key
//! of `sponsorship_events`, so a redelivered event finds its row and becomes
//! a no-op. The transaction holds the write lock from its first statement,
//! so events are applied one at a time in arrival order.

use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::models::{
    PaymentEvent, RejectReason, SponsorStatus, SponsorTier, SponsorshipEvent, SponsorshipRecord,
    WebhookOutcome,
};
use super::signature::verify_signature;
use crate::common::{db, ApiError};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("malformed payment event: {0}")]
    Malformed(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Malformed(msg) => ApiError::BadRequest(msg),
            ReconcileError::Database(e) => ApiError::DatabaseError(e),
        }
    }
}

#[derive(Clone, Debug)]
pub struct LedgerReconciler {
    db: SqlitePool,
    webhook_secret: Option<String>,
}

impl LedgerReconciler {
    pub fn new(db: SqlitePool, webhook_secret: Option<String>) -> Self {
        Self { db, webhook_secret }
    }

    /// Process one raw webhook delivery.
    pub async fn receive(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, ReconcileError> {
        let event = PaymentEvent::parse(body).map_err(ReconcileError::Malformed)?;
        debug!(event_id = %event.event_id, user_id = %event.user_id, "Payment event received");

        if let Err(reason) = verify_signature(self.webhook_secret.as_deref(), body, signature) {
            return Ok(reject(&event, reason));
        }

        let Some(status) = SponsorStatus::parse(&event.status) else {
            return Ok(reject(&event, RejectReason::UnsupportedStatus));
        };
        let tier = match event.tier.as_deref() {
            Some(raw) => match SponsorTier::parse(raw) {
                Some(tier) => Some(tier),
                None => return Ok(reject(&event, RejectReason::UnknownTier)),
            },
            None => None,
        };

        self.apply(&event, status, tier).await
    }

    async fn apply(
        &self,
        event: &PaymentEvent,
        status: SponsorStatus,
        tier: Option<SponsorTier>,
    ) -> Result<WebhookOutcome, ReconcileError> {
        let now = Utc::now().to_rfc3339();
        let tier = tier.map(|t| t.as_str());
        let mut tx = db::begin_write(&self.db).await?;

        let user: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE id = ?")
            .bind(&event.user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if user.is_none() {
            return Ok(reject(event, RejectReason::UnknownUser));
        }

        let recorded = sqlx::query(
            r#"
            INSERT INTO sponsorship_events (event_id, user_id, status, tier, payment_id, applied_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(event_id) DO NOTHING
            "#,
        )
        .bind(&event.event_id)
        .bind(&event.user_id)
        .bind(status.as_str())
        .bind(tier)
        .bind(event.payment_id.as_deref())
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        if recorded.rows_affected() == 0 {
            info!(event_id = %event.event_id, user_id = %event.user_id, "Duplicate payment event ignored");
            return Ok(WebhookOutcome::Duplicate);
        }

        let activated_at = (status == SponsorStatus::Active).then(|| now.clone());
        sqlx::query(
            r#"
            INSERT INTO sponsorships
                (user_id, tier, status, last_event_id, payment_id, invoice_url, activated_at, created_at, updated_at)
            VALUES (?, COALESCE(?, 'individual'), ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                tier = COALESCE(?, sponsorships.tier),
                status = excluded.status,
                last_event_id = excluded.last_event_id,
                payment_id = COALESCE(excluded.payment_id, sponsorships.payment_id),
                invoice_url = COALESCE(excluded.invoice_url, sponsorships.invoice_url),
                activated_at = CASE
                    WHEN excluded.status = 'active' AND sponsorships.status != 'active'
                        THEN excluded.activated_at
                    ELSE sponsorships.activated_at
                END,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&event.user_id)
        .bind(tier)
        .bind(status.as_str())
        .bind(&event.event_id)
        .bind(event.payment_id.as_deref())
        .bind(event.invoice_url.as_deref())
        .bind(activated_at.as_deref())
        .bind(&now)
        .bind(&now)
        .bind(tier)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            event_id = %event.event_id,
            user_id = %event.user_id,
            status = status.as_str(),
            tier = ?tier,
            "Payment event applied"
        );
        Ok(WebhookOutcome::Applied)
    }

    /// Current record and applied-event history for `user_id`, oldest first.
    pub async fn ledger_for(
        &self,
        user_id: &str,
    ) -> Result<(Option<SponsorshipRecord>, Vec<SponsorshipEvent>), sqlx::Error> {
        let record = sqlx::query_as::<_, SponsorshipRecord>("SELECT * FROM sponsorships WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;
        let events = sqlx::query_as::<_, SponsorshipEvent>(
            "SELECT * FROM sponsorship_events WHERE user_id = ? ORDER BY applied_at ASC, rowid ASC",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok((record, events))
    }
}

fn reject(event: &PaymentEvent, reason: RejectReason) -> WebhookOutcome {
    warn!(
        event_id = %event.event_id,
        user_id = %event.user_id,
        reason = reason.as_str(),
        "Payment event rejected"
    );
    WebhookOutcome::Rejected(reason)
}
