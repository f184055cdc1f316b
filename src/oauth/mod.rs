//! # OAuth Module
//!
//! Provider logins for GitHub, Google and LinkedIn:
//! - Provider adapters normalizing each provider to one profile shape
//! - Single-use, expiring state tokens
//! - One generic flow driving login -> callback -> token -> profile -> account

pub mod flow;
pub mod github;
pub mod google;
pub mod handlers;
pub mod linkedin;
pub mod provider;
pub mod registry;
pub mod routes;
pub mod state_store;

#[cfg(test)]
mod tests;

pub use flow::{AttemptPhase, CallbackParams, FailureReason, OAuthFlow};
pub use provider::{ExternalProfile, ProviderAdapter, ProviderError, ProviderKind};
pub use registry::ProviderRegistry;
pub use routes::oauth_routes;
pub use state_store::OAuthStateStore;
