//! Sponsorship ledger models

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SponsorTier {
    Individual,
    Team,
}

impl SponsorTier {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "individual" => Some(SponsorTier::Individual),
            "team" => Some(SponsorTier::Team),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SponsorTier::Individual => "individual",
            SponsorTier::Team => "team",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SponsorStatus {
    Pending,
    Active,
    Cancelled,
    Failed,
    Refunded,
    Expired,
}

impl SponsorStatus {
    /// Payment processors report a finished payment as `completed`; the
    /// ledger records it as `active`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "pending" => Some(SponsorStatus::Pending),
            "completed" | "active" => Some(SponsorStatus::Active),
            "cancelled" | "canceled" => Some(SponsorStatus::Cancelled),
            "failed" => Some(SponsorStatus::Failed),
            "refunded" => Some(SponsorStatus::Refunded),
            "expired" => Some(SponsorStatus::Expired),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SponsorStatus::Pending => "pending",
            SponsorStatus::Active => "active",
            SponsorStatus::Cancelled => "cancelled",
            SponsorStatus::Failed => "failed",
            SponsorStatus::Refunded => "refunded",
            SponsorStatus::Expired => "expired",
        }
    }
}

/// Webhook body as delivered. Either `id` or `event_id` names the event and
/// either `plan_type` or `tier` names the tier.
#[derive(Debug, Deserialize)]
struct RawPaymentEvent {
    id: Option<String>,
    event_id: Option<String>,
    user_id: Option<String>,
    status: Option<String>,
    plan_type: Option<String>,
    tier: Option<String>,
    payment_id: Option<String>,
    invoice_url: Option<String>,
}

/// A structurally valid payment event. Status and tier are still raw here;
/// the reconciler decides whether it understands them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentEvent {
    pub event_id: String,
    pub user_id: String,
    pub status: String,
    pub tier: Option<String>,
    pub payment_id: Option<String>,
    pub invoice_url: Option<String>,
}

fn present(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl PaymentEvent {
    pub fn parse(body: &[u8]) -> Result<Self, String> {
        let raw: RawPaymentEvent =
            serde_json::from_slice(body).map_err(|e| format!("invalid JSON payload: {}", e))?;

        let event_id = present(raw.id)
            .or_else(|| present(raw.event_id))
            .ok_or_else(|| "missing event id".to_string())?;
        let user_id = present(raw.user_id).ok_or_else(|| "missing user_id".to_string())?;
        let status = present(raw.status).ok_or_else(|| "missing status".to_string())?;

        Ok(Self {
            event_id,
            user_id,
            status,
            tier: present(raw.plan_type).or_else(|| present(raw.tier)),
            payment_id: present(raw.payment_id),
            invoice_url: present(raw.invoice_url),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    SecretNotConfigured,
    MissingSignature,
    InvalidSignature,
    UnknownUser,
    UnsupportedStatus,
    UnknownTier,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::SecretNotConfigured => "secret_not_configured",
            RejectReason::MissingSignature => "missing_signature",
            RejectReason::InvalidSignature => "invalid_signature",
            RejectReason::UnknownUser => "unknown_user",
            RejectReason::UnsupportedStatus => "unsupported_status",
            RejectReason::UnknownTier => "unknown_tier",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied,
    /// Already applied earlier; nothing changed.
    Duplicate,
    Rejected(RejectReason),
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl From<WebhookOutcome> for WebhookResponse {
    fn from(outcome: WebhookOutcome) -> Self {
        match outcome {
            WebhookOutcome::Applied => Self {
                status: "applied",
                reason: None,
            },
            WebhookOutcome::Duplicate => Self {
                status: "duplicate",
                reason: None,
            },
            WebhookOutcome::Rejected(reason) => Self {
                status: "rejected",
                reason: Some(reason.as_str()),
            },
        }
    }
}

#[derive(FromRow, Serialize, Debug, Clone)]
pub struct SponsorshipRecord {
    pub user_id: String,
    pub tier: String,
    pub status: String,
    pub last_event_id: String,
    pub payment_id: Option<String>,
    pub invoice_url: Option<String>,
    pub activated_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(FromRow, Serialize, Debug, Clone)]
pub struct SponsorshipEvent {
    pub event_id: String,
    #[serde(skip_serializing)]
    pub user_id: String,
    pub status: String,
    pub tier: Option<String>,
    pub payment_id: Option<String>,
    pub applied_at: String,
}

#[derive(Serialize, Debug)]
pub struct MySponsorshipsResponse {
    pub sponsorship: Option<SponsorshipRecord>,
    pub events: Vec<SponsorshipEvent>,
}
