//! Generic OAuth attempt driver.
//!
//! One algorithm serves every provider: the adapter supplies the three
//! provider-specific calls and this module walks an attempt through
//!
//! ```text
//! Initiated -> CallbackReceived -> TokenExchanged -> ProfileFetched -> Resolved
//!      \________________\_________________\________________\______-> Failed
//! ```
//!
//! Any failure ends the attempt with the originating error kind preserved.
//! Every adapter call runs under a deadline so no attempt blocks forever.

use chrono::Utc;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

use super::provider::{ExternalProfile, ProviderError, ProviderKind, TOKEN_EXCHANGE_ATTEMPTS, TOKEN_RETRY_BACKOFF};
use super::registry::ProviderRegistry;
use super::state_store::{OAuthStateStore, StateCheck};
use crate::auth::{AccountResolver, ResolveError, Resolved};
use crate::common::helpers::safe_token_log;
use crate::common::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    Initiated,
    CallbackReceived,
    TokenExchanged,
    ProfileFetched,
    Resolved,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    StateMismatch,
    StaleState,
    AuthorizationDenied(String),
    ProviderUnreachable(String),
    ProviderError(String),
    AmbiguousIdentity(String),
    NotConfigured,
    Storage,
}

impl From<FailureReason> for ApiError {
    fn from(reason: FailureReason) -> Self {
        match reason {
            FailureReason::StateMismatch => ApiError::StateMismatch,
            FailureReason::StaleState => ApiError::StaleState,
            FailureReason::AuthorizationDenied(msg) => ApiError::AuthorizationDenied(msg),
            FailureReason::ProviderUnreachable(msg) => ApiError::ProviderUnavailable(msg),
            FailureReason::ProviderError(msg) => ApiError::ProviderError(msg),
            FailureReason::AmbiguousIdentity(msg) => ApiError::AmbiguousIdentity {
                message: msg,
                link_ticket: None,
            },
            FailureReason::NotConfigured => {
                ApiError::ProviderMisconfigured("provider is not configured".to_string())
            }
            FailureReason::Storage => ApiError::InternalServer("storage failure".to_string()),
        }
    }
}

impl From<ProviderError> for FailureReason {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Unreachable(msg) => FailureReason::ProviderUnreachable(msg),
            ProviderError::Denied(msg) => FailureReason::AuthorizationDenied(msg),
            ProviderError::Rejected(msg) => FailureReason::ProviderError(msg),
        }
    }
}

/// Query string of a provider callback.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FlowSuccess {
    pub resolved: Resolved,
    pub trail: Vec<AttemptPhase>,
}

#[derive(Debug, Clone)]
pub struct FlowFailure {
    pub reason: FailureReason,
    /// The profile, when the attempt got as far as fetching it.
    pub profile: Option<ExternalProfile>,
    pub trail: Vec<AttemptPhase>,
}

impl FlowFailure {
    /// Last phase reached before failing.
    pub fn reached(&self) -> AttemptPhase {
        self.trail
            .iter()
            .rev()
            .copied()
            .find(|phase| *phase != AttemptPhase::Failed)
            .unwrap_or(AttemptPhase::Initiated)
    }
}

struct Attempt {
    provider: ProviderKind,
    trail: Vec<AttemptPhase>,
    profile: Option<ExternalProfile>,
}

impl Attempt {
    fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            trail: vec![AttemptPhase::Initiated],
            profile: None,
        }
    }

    fn advance(&mut self, phase: AttemptPhase) {
        self.trail.push(phase);
    }

    fn fail(mut self, reason: FailureReason) -> FlowFailure {
        warn!(
            provider = %self.provider,
            reached = ?self.trail.last(),
            reason = ?reason,
            "OAuth attempt failed"
        );
        self.trail.push(AttemptPhase::Failed);
        FlowFailure {
            reason,
            profile: self.profile,
            trail: self.trail,
        }
    }
}

pub struct OAuthFlow {
    providers: ProviderRegistry,
    states: OAuthStateStore,
    resolver: AccountResolver,
    call_timeout: Duration,
}

impl OAuthFlow {
    pub fn new(
        providers: ProviderRegistry,
        states: OAuthStateStore,
        resolver: AccountResolver,
        call_timeout: Duration,
    ) -> Self {
        Self {
            providers,
            states,
            resolver,
            call_timeout,
        }
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn states(&self) -> &OAuthStateStore {
        &self.states
    }

    // The exchange may spend its retry, so it gets room for every attempt.
    fn exchange_deadline(&self) -> Duration {
        self.call_timeout * TOKEN_EXCHANGE_ATTEMPTS + TOKEN_RETRY_BACKOFF
    }

    /// Issue a fresh state and return the provider URL to redirect the browser to.
    pub async fn begin(&self, provider: ProviderKind) -> Result<String, FailureReason> {
        let adapter = self
            .providers
            .get(provider)
            .ok_or(FailureReason::NotConfigured)?;

        let state = self.states.issue(provider).await.map_err(|e| {
            error!(error = %e, provider = %provider, "Failed to store OAuth state");
            FailureReason::Storage
        })?;

        info!(provider = %provider, "OAuth attempt initiated");
        Ok(adapter.authorize_url(&state))
    }

    /// Drive a callback to a resolved user, or to a failure naming where and why.
    pub async fn complete(
        &self,
        provider: ProviderKind,
        params: CallbackParams,
    ) -> Result<FlowSuccess, FlowFailure> {
        let mut attempt = Attempt::new(provider);

        let Some(adapter) = self.providers.get(provider) else {
            return Err(attempt.fail(FailureReason::NotConfigured));
        };

        let Some(state) = params.state.as_deref().filter(|s| !s.is_empty()) else {
            return Err(attempt.fail(FailureReason::StateMismatch));
        };
        match self.states.consume(state, provider, Utc::now().timestamp()).await {
            Ok(StateCheck::Accepted) => {}
            Ok(StateCheck::Expired) => return Err(attempt.fail(FailureReason::StaleState)),
            Ok(check @ (StateCheck::Unknown | StateCheck::WrongProvider)) => {
                warn!(provider = %provider, state = %safe_token_log(state), check = ?check, "Callback state not accepted");
                return Err(attempt.fail(FailureReason::StateMismatch));
            }
            Err(e) => {
                error!(error = %e, provider = %provider, "Failed to consume OAuth state");
                return Err(attempt.fail(FailureReason::Storage));
            }
        }
        attempt.advance(AttemptPhase::CallbackReceived);

        if let Some(error) = params.error {
            let detail = match params.error_description {
                Some(description) => format!("{}: {}", error, description),
                None => error,
            };
            return Err(attempt.fail(FailureReason::AuthorizationDenied(detail)));
        }
        let Some(code) = params.code.filter(|c| !c.is_empty()) else {
            return Err(attempt.fail(FailureReason::ProviderError(
                "callback carried neither a code nor an error".to_string(),
            )));
        };

        let access_token = match bounded(self.exchange_deadline(), adapter.exchange_code(&code)).await {
            Ok(token) => token,
            Err(reason) => return Err(attempt.fail(reason)),
        };
        attempt.advance(AttemptPhase::TokenExchanged);

        let profile = match bounded(self.call_timeout, adapter.fetch_profile(&access_token)).await {
            Ok(profile) => profile,
            Err(reason) => return Err(attempt.fail(reason)),
        };
        attempt.profile = Some(profile.clone());
        attempt.advance(AttemptPhase::ProfileFetched);

        let resolved = match self.resolver.resolve_external(&profile).await {
            Ok(resolved) => resolved,
            Err(ResolveError::Ambiguous { reason }) => {
                return Err(attempt.fail(FailureReason::AmbiguousIdentity(reason)))
            }
            Err(e) => {
                error!(error = %e, provider = %provider, "Account resolution failed");
                return Err(attempt.fail(FailureReason::Storage));
            }
        };
        attempt.advance(AttemptPhase::Resolved);

        info!(
            provider = %provider,
            user_id = %resolved.user_id,
            outcome = resolved.resolution.as_str(),
            "OAuth attempt resolved"
        );
        Ok(FlowSuccess {
            resolved,
            trail: attempt.trail,
        })
    }
}

async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, FailureReason>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(FailureReason::from),
        Err(_) => Err(FailureReason::ProviderUnreachable(format!(
            "provider did not answer within {}s",
            limit.as_secs()
        ))),
    }
}
