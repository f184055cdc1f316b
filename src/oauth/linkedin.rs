//! LinkedIn adapter using Sign In with LinkedIn (OpenID Connect userinfo)

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::provider::{
    build_authorize_url, get_json, request_access_token, ExternalProfile, OAuthClientConfig,
    ProviderAdapter, ProviderEndpoints, ProviderError, ProviderKind,
};

const SCOPE: &str = "openid profile email";

#[derive(Debug, Deserialize)]
struct LinkedInUserInfo {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    picture: Option<String>,
}

impl LinkedInUserInfo {
    fn display_name(&self) -> Option<String> {
        if let Some(name) = self.name.as_ref().filter(|n| !n.trim().is_empty()) {
            return Some(name.clone());
        }
        let joined = [self.given_name.as_deref(), self.family_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        Some(joined).filter(|n| !n.is_empty())
    }
}

impl ProviderEndpoints {
    pub fn linkedin() -> Self {
        Self {
            authorize_url: "https://www.linkedin.com/oauth/v2/authorization".to_string(),
            token_url: "https://www.linkedin.com/oauth/v2/accessToken".to_string(),
            profile_url: "https://api.linkedin.com/v2/userinfo".to_string(),
            emails_url: None,
        }
    }
}

pub struct LinkedInAdapter {
    http: Client,
    client: OAuthClientConfig,
    endpoints: ProviderEndpoints,
}

impl LinkedInAdapter {
    pub fn new(http: Client, client: OAuthClientConfig) -> Self {
        Self::with_endpoints(http, client, ProviderEndpoints::linkedin())
    }

    pub fn with_endpoints(http: Client, client: OAuthClientConfig, endpoints: ProviderEndpoints) -> Self {
        Self {
            http,
            client,
            endpoints,
        }
    }
}

#[async_trait]
impl ProviderAdapter for LinkedInAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::LinkedIn
    }

    fn authorize_url(&self, state: &str) -> String {
        build_authorize_url(&self.endpoints, &self.client, SCOPE, state)
    }

    async fn exchange_code(&self, code: &str) -> Result<String, ProviderError> {
        request_access_token(&self.http, &self.endpoints.token_url, &self.client, code).await
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ExternalProfile, ProviderError> {
        let info: LinkedInUserInfo = get_json(&self.http, &self.endpoints.profile_url, access_token).await?;
        let name = info.display_name();

        Ok(ExternalProfile {
            provider: ProviderKind::LinkedIn,
            subject: info.sub,
            email_verified: info.email_verified && info.email.is_some(),
            email: info.email,
            name,
            avatar: info.picture,
        })
    }
}
