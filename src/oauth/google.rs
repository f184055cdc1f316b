//! Google OAuth adapter (v2 userinfo)

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::provider::{
    build_authorize_url, get_json, request_access_token, ExternalProfile, OAuthClientConfig,
    ProviderAdapter, ProviderEndpoints, ProviderError, ProviderKind,
};

const SCOPE: &str = "openid email profile";

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: Option<String>,
    #[serde(default)]
    verified_email: bool,
    name: Option<String>,
    picture: Option<String>,
}

impl ProviderEndpoints {
    pub fn google() -> Self {
        Self {
            authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            profile_url: "https://www.googleapis.com/oauth2/v2/userinfo".to_string(),
            emails_url: None,
        }
    }
}

pub struct GoogleAdapter {
    http: Client,
    client: OAuthClientConfig,
    endpoints: ProviderEndpoints,
}

impl GoogleAdapter {
    pub fn new(http: Client, client: OAuthClientConfig) -> Self {
        Self::with_endpoints(http, client, ProviderEndpoints::google())
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
impl ProviderAdapter for GoogleAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn authorize_url(&self, state: &str) -> String {
        build_authorize_url(&self.endpoints, &self.client, SCOPE, state)
    }

    async fn exchange_code(&self, code: &str) -> Result<String, ProviderError> {
        request_access_token(&self.http, &self.endpoints.token_url, &self.client, code).await
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ExternalProfile, ProviderError> {
        let info: GoogleUserInfo = get_json(&self.http, &self.endpoints.profile_url, access_token).await?;

        Ok(ExternalProfile {
            provider: ProviderKind::Google,
            subject: info.id,
            email_verified: info.verified_email && info.email.is_some(),
            email: info.email,
            name: info.name,
            avatar: info.picture,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_userinfo_maps_verified_email() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth2/v2/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "109876543210",
                "email": "a@x.com",
                "verified_email": true,
                "name": "Alice",
                "picture": "https://lh3.googleusercontent.com/a"
            })))
            .mount(&server)
            .await;

        let adapter = GoogleAdapter::with_endpoints(
            Client::new(),
            OAuthClientConfig {
                client_id: "g-id".to_string(),
                client_secret: "g-secret".to_string(),
                redirect_uri: "http://localhost:8080/auth/google/callback".to_string(),
            },
            ProviderEndpoints {
                profile_url: format!("{}/oauth2/v2/userinfo", server.uri()),
                ..ProviderEndpoints::google()
            },
        );

        let profile = adapter.fetch_profile("ya29.token").await.unwrap();
        assert_eq!(profile.provider, ProviderKind::Google);
        assert_eq!(profile.subject, "109876543210");
        assert!(profile.email_verified);
        assert_eq!(profile.avatar.as_deref(), Some("https://lh3.googleusercontent.com/a"));
    }
}
