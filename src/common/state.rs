// Application state shared across all modules

use sqlx::SqlitePool;
use std::sync::Arc;

use super::config::AppConfig;
use crate::auth::{AccountResolver, CredentialStore, SessionIssuer};
use crate::oauth::{OAuthFlow, OAuthStateStore, ProviderRegistry};
use crate::sponsors::LedgerReconciler;

/// Application state containing database pool, services, and configuration
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
    pub store: CredentialStore,
    pub sessions: Arc<SessionIssuer>,
    pub resolver: AccountResolver,
    pub oauth: Arc<OAuthFlow>,
    pub ledger: Arc<LedgerReconciler>,
}

impl AppState {
    /// Wire every service onto one pool.
    pub fn new(db: SqlitePool, config: AppConfig, providers: ProviderRegistry) -> Self {
        let store = CredentialStore::new(db.clone());
        let sessions = Arc::new(SessionIssuer::new(
            &config.jwt_secret,
            config.session_ttl,
            store.clone(),
        ));
        let resolver = AccountResolver::new(db.clone());
        let states = OAuthStateStore::new(db.clone(), config.oauth_state_ttl);
        let oauth = Arc::new(OAuthFlow::new(
            providers,
            states,
            resolver.clone(),
            config.provider_timeout,
        ));
        let ledger = Arc::new(LedgerReconciler::new(db.clone(), config.webhook_secret.clone()));

        Self {
            db,
            config: Arc::new(config),
            store,
            sessions,
            resolver,
            oauth,
            ledger,
        }
    }
}
