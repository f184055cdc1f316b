//! # GitHub OAuth adapter
//!
//! Profile comes from `GET /user`. GitHub only reports whether an address is
//! verified through `GET /user/emails`, so the primary verified address from
//! that list is preferred over the (possibly absent) public profile email.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::provider::{
    build_authorize_url, get_json, request_access_token, ExternalProfile, OAuthClientConfig,
    ProviderAdapter, ProviderEndpoints, ProviderError, ProviderKind,
};

const SCOPE: &str = "read:user user:email";

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: i64,
    login: String,
    email: Option<String>,
    name: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

impl ProviderEndpoints {
    pub fn github() -> Self {
        Self {
            authorize_url: "https://github.com/login/oauth/authorize".to_string(),
            token_url: "https://github.com/login/oauth/access_token".to_string(),
            profile_url: "https://api.github.com/user".to_string(),
            emails_url: Some("https://api.github.com/user/emails".to_string()),
        }
    }
}

pub struct GitHubAdapter {
    http: Client,
    client: OAuthClientConfig,
    endpoints: ProviderEndpoints,
}

impl GitHubAdapter {
    pub fn new(http: Client, client: OAuthClientConfig) -> Self {
        Self::with_endpoints(http, client, ProviderEndpoints::github())
    }

    pub fn with_endpoints(http: Client, client: OAuthClientConfig, endpoints: ProviderEndpoints) -> Self {
        Self {
            http,
            client,
            endpoints,
        }
    }
}

fn pick_email(user: &GitHubUser, emails: &[GitHubEmail]) -> (Option<String>, bool) {
    if let Some(primary) = emails.iter().find(|e| e.primary && e.verified) {
        return (Some(primary.email.clone()), true);
    }
    match &user.email {
        Some(public) => {
            let verified = emails.iter().any(|e| e.verified && e.email.eq_ignore_ascii_case(public));
            (Some(public.clone()), verified)
        }
        None => match emails.iter().find(|e| e.verified) {
            Some(verified) => (Some(verified.email.clone()), true),
            None => (None, false),
        },
    }
}

#[async_trait]
impl ProviderAdapter for GitHubAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GitHub
    }

    fn authorize_url(&self, state: &str) -> String {
        build_authorize_url(&self.endpoints, &self.client, SCOPE, state)
    }

    async fn exchange_code(&self, code: &str) -> Result<String, ProviderError> {
        request_access_token(&self.http, &self.endpoints.token_url, &self.client, code).await
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ExternalProfile, ProviderError> {
        let user: GitHubUser = get_json(&self.http, &self.endpoints.profile_url, access_token).await?;

        let emails: Vec<GitHubEmail> = match &self.endpoints.emails_url {
            Some(url) => match get_json(&self.http, url, access_token).await {
                Ok(emails) => emails,
                // Missing scope or the endpoint refusing us just means no verified email.
                Err(ProviderError::Rejected(reason)) => {
                    warn!(reason = %reason, "GitHub email list unavailable");
                    Vec::new()
                }
                Err(e) => return Err(e),
            },
            None => Vec::new(),
        };

        let (email, email_verified) = pick_email(&user, &emails);
        debug!(subject = user.id, email_verified = email_verified, "GitHub profile fetched");

        Ok(ExternalProfile {
            provider: ProviderKind::GitHub,
            subject: user.id.to_string(),
            email,
            email_verified,
            name: user.name.filter(|n| !n.trim().is_empty()).or(Some(user.login)),
            avatar: user.avatar_url,
        })
    }
}
