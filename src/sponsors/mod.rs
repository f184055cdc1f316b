//! # Sponsors Module
//!
//! Sponsorship ledger fed by payment processor webhooks:
//! - HMAC-SHA256 signature check over the raw body
//! - Idempotent application keyed by event id
//! - Per-user sponsorship record and event history

pub mod handlers;
pub mod models;
pub mod reconciler;
pub mod routes;
pub mod signature;


pub use reconciler::LedgerReconciler;
pub use routes::sponsors_routes;
