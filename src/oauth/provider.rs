//! Provider adapter contract and the HTTP plumbing the adapters share.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Sent on every provider call; GitHub rejects requests without one.
pub const CLIENT_USER_AGENT: &str = concat!("sponsor-auth/", env!("CARGO_PKG_VERSION"));

/// Token exchange is attempted at most this many times.
pub const TOKEN_EXCHANGE_ATTEMPTS: u32 = 2;
pub const TOKEN_RETRY_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    GitHub,
    Google,
    LinkedIn,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [ProviderKind::GitHub, ProviderKind::Google, ProviderKind::LinkedIn];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::GitHub => "github",
            ProviderKind::Google => "google",
            ProviderKind::LinkedIn => "linkedin",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown provider: {}", s))
    }
}

/// Provider profile normalized to the shape the account resolver consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalProfile {
    pub provider: ProviderKind,
    pub subject: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub name: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Network failure, timeout or a 5xx from the provider.
    #[error("provider unreachable: {0}")]
    Unreachable(String),

    /// The user (or provider policy) refused consent.
    #[error("authorization denied: {0}")]
    Denied(String),

    /// The provider answered but refused the request or sent something unusable.
    #[error("provider rejected the request: {0}")]
    Rejected(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Unreachable(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::Rejected(format!("unreadable response: {}", e))
        } else {
            ProviderError::Unreachable(e.to_string())
        }
    }
}

/// Per-provider capability set driven by the generic OAuth flow.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Browser redirect target carrying `state` unmodified.
    fn authorize_url(&self, state: &str) -> String;

    /// Trade an authorization code for an access token.
    async fn exchange_code(&self, code: &str) -> Result<String, ProviderError>;

    async fn fetch_profile(&self, access_token: &str) -> Result<ExternalProfile, ProviderError>;
}

/// Registered OAuth application for one provider.
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// Provider URLs, overridable so tests can point adapters at a mock server.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub profile_url: String,
    /// Secondary profile call; only GitHub needs one.
    pub emails_url: Option<String>,
}

pub fn build_authorize_url(
    endpoints: &ProviderEndpoints,
    client: &OAuthClientConfig,
    scope: &str,
    state: &str,
) -> String {
    format!(
        "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
        endpoints.authorize_url,
        urlencoding::encode(&client.client_id),
        urlencoding::encode(&client.redirect_uri),
        urlencoding::encode(scope),
        urlencoding::encode(state),
    )
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

async fn post_token_request(
    http: &Client,
    token_url: &str,
    client: &OAuthClientConfig,
    code: &str,
) -> Result<String, ProviderError> {
    let params = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", client.redirect_uri.as_str()),
        ("client_id", client.client_id.as_str()),
        ("client_secret", client.client_secret.as_str()),
    ];

    let response = http
        .post(token_url)
        .header(ACCEPT, "application/json")
        .header(USER_AGENT, CLIENT_USER_AGENT)
        .form(&params)
        .send()
        .await?;

    let status = response.status();
    if status.is_server_error() {
        return Err(ProviderError::Unreachable(format!(
            "token endpoint returned {}",
            status
        )));
    }

    // Error details arrive as JSON on 4xx too, so parse before judging the status.
    let body = response.text().await?;
    let parsed: TokenEndpointResponse = match serde_json::from_str(&body) {
        Ok(parsed) => parsed,
        Err(_) => {
            return Err(ProviderError::Rejected(format!(
                "token endpoint returned {} with an unreadable body",
                status
            )))
        }
    };

    if let Some(error) = parsed.error {
        let detail = match parsed.error_description {
            Some(description) => format!("{}: {}", error, description),
            None => error.clone(),
        };
        return Err(if error == "access_denied" {
            ProviderError::Denied(detail)
        } else {
            ProviderError::Rejected(detail)
        });
    }

    match parsed.access_token {
        Some(token) if status.is_success() && !token.is_empty() => Ok(token),
        _ => Err(ProviderError::Rejected(format!(
            "token endpoint returned {} without an access token",
            status
        ))),
    }
}

/// Exchange `code` at `token_url`, retrying once after a short backoff when
/// the provider could not be reached.
pub async fn request_access_token(
    http: &Client,
    token_url: &str,
    client: &OAuthClientConfig,
    code: &str,
) -> Result<String, ProviderError> {
    let mut attempt = 1;
    loop {
        match post_token_request(http, token_url, client, code).await {
            Err(e) if e.is_retryable() && attempt < TOKEN_EXCHANGE_ATTEMPTS => {
                warn!(error = %e, attempt = attempt, "Token exchange failed, retrying");
                tokio::time::sleep(TOKEN_RETRY_BACKOFF).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Authenticated GET for profile data. Never retried.
pub async fn get_json<T: DeserializeOwned>(
    http: &Client,
    url: &str,
    access_token: &str,
) -> Result<T, ProviderError> {
    let response = http
        .get(url)
        .bearer_auth(access_token)
        .header(ACCEPT, "application/json")
        .header(USER_AGENT, CLIENT_USER_AGENT)
        .send()
        .await?;

    let status = response.status();
    debug!(url = %url, http_status = %status, "Provider profile response");

    if status.is_server_error() {
        return Err(ProviderError::Unreachable(format!("{} returned {}", url, status)));
    }
    if !status.is_success() {
        return Err(ProviderError::Rejected(format!("{} returned {}", url, status)));
    }

    Ok(response.json::<T>().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_config() -> OAuthClientConfig {
        OAuthClientConfig {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            redirect_uri: "http://localhost:8080/auth/github/callback".to_string(),
        }
    }

    #[test]
    fn test_provider_kind_round_trips_through_path_segment() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
        assert_eq!("GitHub".parse::<ProviderKind>().unwrap(), ProviderKind::GitHub);
        assert!("myspace".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_authorize_url_carries_encoded_parameters() {
        let endpoints = ProviderEndpoints {
            authorize_url: "https://idp.example/authorize".to_string(),
            token_url: String::new(),
            profile_url: String::new(),
            emails_url: None,
        };
        let url = build_authorize_url(&endpoints, &client_config(), "read:user user:email", "abc123");

        assert!(url.starts_with("https://idp.example/authorize?response_type=code"));
        assert!(url.contains("client_id=client-id"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fauth%2Fgithub%2Fcallback"));
        assert!(url.contains("scope=read%3Auser%20user%3Aemail"));
        assert!(url.ends_with("state=abc123"));
    }

    #[tokio::test]
    async fn test_token_exchange_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(header("accept", "application/json"))
            .and(body_string_contains("code=the-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "gho_token",
                "token_type": "bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = request_access_token(
            &Client::new(),
            &format!("{}/token", server.uri()),
            &client_config(),
            "the-code",
        )
        .await
        .unwrap();
        assert_eq!(token, "gho_token");
    }

    #[tokio::test]
    async fn test_token_exchange_retries_once_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let result = request_access_token(
            &Client::new(),
            &format!("{}/token", server.uri()),
            &client_config(),
            "the-code",
        )
        .await;
        assert!(matches!(result, Err(ProviderError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_token_error_field_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "code already used"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = request_access_token(
            &Client::new(),
            &format!("{}/token", server.uri()),
            &client_config(),
            "the-code",
        )
        .await;
        assert_eq!(
            result,
            Err(ProviderError::Rejected("invalid_grant: code already used".to_string()))
        );
    }

    #[tokio::test]
    async fn test_access_denied_is_distinguishable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": "access_denied"
            })))
            .mount(&server)
            .await;

        let result =
            request_access_token(&Client::new(), &server.uri(), &client_config(), "c").await;
        assert!(matches!(result, Err(ProviderError::Denied(_))));
    }

    #[tokio::test]
    async fn test_profile_fetch_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(502))
            .expect(1)
            .mount(&server)
            .await;

        let result: Result<serde_json::Value, _> =
            get_json(&Client::new(), &format!("{}/user", server.uri()), "token").await;
        assert!(matches!(result, Err(ProviderError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_profile_fetch_rejected_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("authorization", "Bearer bad"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result: Result<serde_json::Value, _> =
            get_json(&Client::new(), &format!("{}/user", server.uri()), "bad").await;
        assert!(matches!(result, Err(ProviderError::Rejected(_))));
    }
}
