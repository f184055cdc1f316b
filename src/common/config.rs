// src/common/config.rs
//! Environment-driven configuration

use std::env;
use std::time::Duration;
use tracing::warn;

use crate::oauth::ProviderKind;

pub const PLACEHOLDER_JWT_SECRET: &str = "replace_with_strong_secret";

/// Upper bound for how long an OAuth state token stays redeemable.
pub const MAX_OAUTH_STATE_TTL_MINUTES: i64 = 10;

/// Upper bound for the session credential lifetime (30 days).
pub const MAX_SESSION_TTL_MINUTES: i64 = 30 * 24 * 60;

/// Client id/secret pair for one OAuth provider.
#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    pub session_ttl: chrono::Duration,
    pub oauth_state_ttl: chrono::Duration,
    pub callback_base_url: String,
    pub login_redirect_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub github: Option<ProviderCredentials>,
    pub google: Option<ProviderCredentials>,
    pub linkedin: Option<ProviderCredentials>,
    pub provider_timeout: Duration,
    pub cors_origins: Vec<String>,
    pub cookie_secure: bool,
    pub sentry_dsn: Option<String>,
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://sponsor_auth.db".to_string(),
            port: 8080,
            jwt_secret: PLACEHOLDER_JWT_SECRET.to_string(),
            session_ttl: chrono::Duration::minutes(30),
            oauth_state_ttl: chrono::Duration::minutes(MAX_OAUTH_STATE_TTL_MINUTES),
            callback_base_url: "http://localhost:8080".to_string(),
            login_redirect_url: None,
            webhook_secret: None,
            github: None,
            google: None,
            linkedin: None,
            provider_timeout: Duration::from_secs(10),
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
            cookie_secure: true,
            sentry_dsn: None,
            environment: "development".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = env::var("DATABASE_URL") {
            config.database_url = url;
        }

        if let Some(port) = env::var("PORT").ok().and_then(|p| p.parse::<u16>().ok()) {
            config.port = port;
        }

        if let Ok(secret) = env::var("JWT_SECRET") {
            if !secret.is_empty() {
                config.jwt_secret = secret;
            }
        }

        if let Some(ttl) = parse_i64("SESSION_TTL_MINUTES").and_then(session_ttl) {
            config.session_ttl = ttl;
        }

        if let Some(minutes) = parse_i64("OAUTH_STATE_TTL_MINUTES") {
            config.oauth_state_ttl =
                chrono::Duration::minutes(minutes.clamp(1, MAX_OAUTH_STATE_TTL_MINUTES));
        }

        if let Ok(base) = env::var("CALLBACK_BASE_URL") {
            config.callback_base_url = base.trim_end_matches('/').to_string();
        }

        config.login_redirect_url = non_empty("LOGIN_REDIRECT_URL");
        config.webhook_secret = non_empty("WEBHOOK_SECRET");

        config.github = credentials("GITHUB");
        config.google = credentials("GOOGLE");
        config.linkedin = credentials("LINKEDIN");

        if let Some(secs) = parse_i64("PROVIDER_TIMEOUT_SECS") {
            if secs > 0 {
                config.provider_timeout = Duration::from_secs(secs as u64);
            }
        }

        // CORS_ORIGINS - comma-separated list of allowed origins
        if let Ok(origins) = env::var("CORS_ORIGINS") {
            config.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Ok(secure) = env::var("COOKIE_SECURE") {
            config.cookie_secure = secure.to_lowercase() != "false";
        }

        config.sentry_dsn = non_empty("SENTRY_DSN");
        if let Ok(environment) = env::var("ENVIRONMENT") {
            config.environment = environment;
        }

        config
    }

    pub fn provider_credentials(&self, kind: ProviderKind) -> Option<&ProviderCredentials> {
        match kind {
            ProviderKind::GitHub => self.github.as_ref(),
            ProviderKind::Google => self.google.as_ref(),
            ProviderKind::LinkedIn => self.linkedin.as_ref(),
        }
    }

    /// Redirect URI registered with the provider for this deployment.
    pub fn callback_url(&self, kind: ProviderKind) -> String {
        format!("{}/auth/{}/callback", self.callback_base_url, kind.as_str())
    }

    /// Log loud warnings for settings that are unsafe outside development.
    pub fn warn_on_insecure_defaults(&self) {
        if self.jwt_secret == PLACEHOLDER_JWT_SECRET {
            warn!("JWT_SECRET is not set; session credentials are signed with a placeholder secret");
        }
        if self.webhook_secret.is_none() {
            warn!("WEBHOOK_SECRET is not set; every payment webhook will be rejected");
        }
        for kind in ProviderKind::ALL {
            if self.provider_credentials(kind).is_none() {
                warn!(provider = %kind, "OAuth provider not configured");
            }
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_i64(key: &str) -> Option<i64> {
    env::var(key).ok().and_then(|v| v.trim().parse::<i64>().ok())
}

fn credentials(prefix: &str) -> Option<ProviderCredentials> {
    let client_id = non_empty(&format!("{}_CLIENT_ID", prefix))?;
    let client_secret = non_empty(&format!("{}_CLIENT_SECRET", prefix))?;
    Some(ProviderCredentials {
        client_id,
        client_secret,
    })
}

/// Session lifetime for a configured minute count, capped at
/// `MAX_SESSION_TTL_MINUTES`. Non-positive counts are ignored.
fn session_ttl(minutes: i64) -> Option<chrono::Duration> {
    (minutes > 0).then(|| chrono::Duration::minutes(minutes.min(MAX_SESSION_TTL_MINUTES)))
}
