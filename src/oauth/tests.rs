//! Tests for oauth module
//!
//! These tests drive the generic flow with a stub provider:
//! - State tokens: mismatch, replay, staleness
//! - Provider failures: denial, outage, timeout
//! - Account resolution across providers and ambiguous links

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header::LOCATION, header::SET_COOKIE, Method, Request, StatusCode};
    use axum::Router;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::auth::resolver::Resolution;
    use crate::common::state::testing::*;
    use crate::common::{AppConfig, AppState};
    use crate::oauth::{
        AttemptPhase, CallbackParams, ExternalProfile, FailureReason, ProviderAdapter,
        ProviderError, ProviderKind, ProviderRegistry,
    };

    #[derive(Clone, Copy)]
    enum Behaviour {
        Normal,
        Unreachable,
        HangOnProfile,
    }

    /// Provider double: each code maps to the profile it yields.
    struct StubAdapter {
        kind: ProviderKind,
        profiles: HashMap<String, ExternalProfile>,
        behaviour: Behaviour,
    }

    impl StubAdapter {
        fn new(kind: ProviderKind) -> Self {
            Self {
                kind,
                profiles: HashMap::new(),
                behaviour: Behaviour::Normal,
            }
        }

        fn with_profile(mut self, code: &str, profile: ExternalProfile) -> Self {
            self.profiles.insert(code.to_string(), profile);
            self
        }

        fn behaving(mut self, behaviour: Behaviour) -> Self {
            self.behaviour = behaviour;
            self
        }
    }

    #[async_trait]
    impl ProviderAdapter for StubAdapter {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        fn authorize_url(&self, state: &str) -> String {
            format!("https://stub.example/{}/authorize?client_id=test&state={}", self.kind, state)
        }

        async fn exchange_code(&self, code: &str) -> Result<String, ProviderError> {
            if let Behaviour::Unreachable = self.behaviour {
                return Err(ProviderError::Unreachable("connection refused".to_string()));
            }
            if self.profiles.contains_key(code) {
                Ok(format!("token-{}", code))
            } else {
                Err(ProviderError::Rejected("bad_verification_code".to_string()))
            }
        }

        async fn fetch_profile(&self, access_token: &str) -> Result<ExternalProfile, ProviderError> {
            if let Behaviour::HangOnProfile = self.behaviour {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            let code = access_token.trim_start_matches("token-");
            self.profiles
                .get(code)
                .cloned()
                .ok_or_else(|| ProviderError::Rejected("bad credentials".to_string()))
        }
    }

    fn profile(kind: ProviderKind, subject: &str, email: Option<&str>, verified: bool) -> ExternalProfile {
        ExternalProfile {
            provider: kind,
            subject: subject.to_string(),
            email: email.map(str::to_string),
            email_verified: verified,
            name: Some("Bob".to_string()),
            avatar: Some(format!("https://avatars.example/{}", subject)),
        }
    }

    fn registry(adapters: Vec<StubAdapter>) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        for adapter in adapters {
            registry.register(Arc::new(adapter));
        }
        registry
    }

    fn quick_config() -> AppConfig {
        AppConfig {
            provider_timeout: Duration::from_millis(50),
            ..test_config()
        }
    }

    async fn setup(adapters: Vec<StubAdapter>) -> (AppState, Router) {
        let state = test_state(quick_config(), registry(adapters)).await;
        let app = test_app(state.clone());
        (state, app)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    /// Hit the login route and pull the issued state out of the redirect.
    async fn begin(app: &Router, provider: &str) -> String {
        let response = send(app, get(&format!("/auth/{}/login", provider))).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[LOCATION].to_str().unwrap().to_string();
        location.split("state=").nth(1).unwrap().to_string()
    }

    async fn callback(app: &Router, provider: &str, code: &str, state: &str) -> axum::response::Response {
        send(
            app,
            get(&format!("/auth/{}/callback?code={}&state={}", provider, code, state)),
        )
        .await
    }

    async fn user_count(state: &AppState) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&state.db)
            .await
            .unwrap();
        count
    }

    async fn identity_count(state: &AppState) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM external_identities")
            .fetch_one(&state.db)
            .await
            .unwrap();
        count
    }

    fn params(code: &str, state: &str) -> CallbackParams {
        CallbackParams {
            code: Some(code.to_string()),
            state: Some(state.to_string()),
            ..CallbackParams::default()
        }
    }

    #[tokio::test]
    async fn test_login_redirects_to_provider() {
        let (_, app) = setup(vec![StubAdapter::new(ProviderKind::GitHub)]).await;

        let response = send(&app, get("/auth/github/login")).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://stub.example/github/authorize"));

        assert_eq!(send(&app, get("/auth/myspace/login")).await.status(), StatusCode::NOT_FOUND);

        let response = send(&app, get("/auth/linkedin/login")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(read_json(response).await["code"], "PROVIDER_MISCONFIGURED");
    }

    #[tokio::test]
    async fn test_configured_providers_listed() {
        let (_, app) = setup(vec![
            StubAdapter::new(ProviderKind::Google),
            StubAdapter::new(ProviderKind::GitHub),
        ])
        .await;

        let json = read_json(send(&app, get("/auth/providers")).await).await;
        assert_eq!(json["providers"], serde_json::json!(["github", "google"]));
    }

    #[tokio::test]
    async fn test_mismatched_state_creates_nothing() {
        let adapter = StubAdapter::new(ProviderKind::GitHub).with_profile(
            "c1",
            profile(ProviderKind::GitHub, "1001", Some("bob@example.com"), true),
        );
        let (state, app) = setup(vec![adapter]).await;
        begin(&app, "github").await;

        let response = callback(&app, "github", "c1", "forged").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["code"], "STATE_MISMATCH");

        let response = send(&app, get("/auth/github/callback?code=c1")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert_eq!(user_count(&state).await, 0);
        assert_eq!(identity_count(&state).await, 0);
    }

    #[tokio::test]
    async fn test_state_cannot_be_replayed() {
        let adapter = StubAdapter::new(ProviderKind::GitHub).with_profile(
            "c1",
            profile(ProviderKind::GitHub, "1001", Some("bob@example.com"), true),
        );
        let (state, app) = setup(vec![adapter]).await;
        let issued = begin(&app, "github").await;

        let first = callback(&app, "github", "c1", &issued).await;
        assert_eq!(first.status(), StatusCode::OK);
        assert!(first.headers().get(SET_COOKIE).is_some());

        let replay = callback(&app, "github", "c1", &issued).await;
        assert_eq!(replay.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(replay).await["code"], "STATE_MISMATCH");
        assert_eq!(user_count(&state).await, 1);
    }

    #[tokio::test]
    async fn test_state_for_other_provider_is_mismatch() {
        let (state, app) = setup(vec![
            StubAdapter::new(ProviderKind::GitHub),
            StubAdapter::new(ProviderKind::Google).with_profile(
                "c1",
                profile(ProviderKind::Google, "g-1", Some("bob@example.com"), true),
            ),
        ])
        .await;
        let issued = begin(&app, "github").await;

        let response = callback(&app, "google", "c1", &issued).await;
        assert_eq!(read_json(response).await["code"], "STATE_MISMATCH");
        assert_eq!(user_count(&state).await, 0);
    }

    #[tokio::test]
    async fn test_expired_state_is_stale() {
        let adapter = StubAdapter::new(ProviderKind::GitHub).with_profile(
            "c1",
            profile(ProviderKind::GitHub, "1001", Some("bob@example.com"), true),
        );
        let (state, app) = setup(vec![adapter]).await;

        let ttl = state.oauth.states().ttl().num_seconds();
        let issued = state
            .oauth
            .states()
            .issue_at(ProviderKind::GitHub, Utc::now().timestamp() - ttl - 1)
            .await
            .unwrap();

        let response = callback(&app, "github", "c1", &issued).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["code"], "STALE_STATE");
        assert_eq!(user_count(&state).await, 0);
    }

    #[tokio::test]
    async fn test_denied_consent() {
        let (state, app) = setup(vec![StubAdapter::new(ProviderKind::GitHub)]).await;
        let issued = begin(&app, "github").await;

        let response = send(
            &app,
            get(&format!(
                "/auth/github/callback?error=access_denied&error_description=user%20cancelled&state={}",
                issued
            )),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = read_json(response).await;
        assert_eq!(json["code"], "AUTHORIZATION_DENIED");
        assert_eq!(json["error"], "access_denied: user cancelled");
        assert_eq!(user_count(&state).await, 0);
    }

    #[tokio::test]
    async fn test_provider_outage_is_reported_upstream() {
        let adapter = StubAdapter::new(ProviderKind::GitHub)
            .with_profile("c1", profile(ProviderKind::GitHub, "1001", None, false))
            .behaving(Behaviour::Unreachable);
        let (state, app) = setup(vec![adapter]).await;
        let issued = begin(&app, "github").await;

        let response = callback(&app, "github", "c1", &issued).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(read_json(response).await["code"], "PROVIDER_UNAVAILABLE");
        assert_eq!(user_count(&state).await, 0);
    }

    #[tokio::test]
    async fn test_rejected_code_is_provider_error() {
        let (state, app) = setup(vec![StubAdapter::new(ProviderKind::GitHub)]).await;
        let issued = begin(&app, "github").await;

        let response = callback(&app, "github", "unknown-code", &issued).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(read_json(response).await["code"], "PROVIDER_ERROR");
        assert_eq!(user_count(&state).await, 0);
    }

    #[tokio::test]
    async fn test_hanging_profile_call_times_out() {
        let adapter = StubAdapter::new(ProviderKind::GitHub)
            .with_profile("c1", profile(ProviderKind::GitHub, "1001", None, false))
            .behaving(Behaviour::HangOnProfile);
        let (state, _) = setup(vec![adapter]).await;
        let issued = state.oauth.states().issue(ProviderKind::GitHub).await.unwrap();

        let failure = state
            .oauth
            .complete(ProviderKind::GitHub, params("c1", &issued))
            .await
            .unwrap_err();

        assert!(matches!(failure.reason, FailureReason::ProviderUnreachable(_)));
        assert_eq!(failure.reached(), AttemptPhase::TokenExchanged);
        assert_eq!(failure.trail.last(), Some(&AttemptPhase::Failed));
        assert!(failure.profile.is_none());
    }

    #[tokio::test]
    async fn test_same_subject_resolves_to_same_user() {
        let adapter = StubAdapter::new(ProviderKind::GitHub)
            .with_profile("c1", profile(ProviderKind::GitHub, "1001", None, false));
        let (state, _) = setup(vec![adapter]).await;

        let first_state = state.oauth.states().issue(ProviderKind::GitHub).await.unwrap();
        let first = state
            .oauth
            .complete(ProviderKind::GitHub, params("c1", &first_state))
            .await
            .unwrap();
        assert_eq!(first.resolved.resolution, Resolution::Created);
        assert_eq!(
            first.trail,
            vec![
                AttemptPhase::Initiated,
                AttemptPhase::CallbackReceived,
                AttemptPhase::TokenExchanged,
                AttemptPhase::ProfileFetched,
                AttemptPhase::Resolved,
            ]
        );

        let second_state = state.oauth.states().issue(ProviderKind::GitHub).await.unwrap();
        let second = state
            .oauth
            .complete(ProviderKind::GitHub, params("c1", &second_state))
            .await
            .unwrap();
        assert_eq!(second.resolved.resolution, Resolution::Existing);
        assert_eq!(first.resolved.user_id, second.resolved.user_id);
        assert_eq!(user_count(&state).await, 1);
    }

    #[tokio::test]
    async fn test_verified_email_links_second_provider() {
        let (state, app) = setup(vec![
            StubAdapter::new(ProviderKind::GitHub).with_profile(
                "gh",
                profile(ProviderKind::GitHub, "1001", Some("Bob@Example.com"), true),
            ),
            StubAdapter::new(ProviderKind::Google).with_profile(
                "go",
                profile(ProviderKind::Google, "g-77", Some("bob@example.com"), true),
            ),
        ])
        .await;

        let issued = begin(&app, "github").await;
        let github = read_json(callback(&app, "github", "gh", &issued).await).await;

        let issued = begin(&app, "google").await;
        let google = read_json(callback(&app, "google", "go", &issued).await).await;

        assert_eq!(github["user"]["id"], google["user"]["id"]);
        assert_eq!(user_count(&state).await, 1);
        assert_eq!(identity_count(&state).await, 2);

        let token = google["token"].as_str().unwrap();
        let me = read_json(send(&app, bearer_request(Method::GET, "/auth/me", token)).await).await;
        assert_eq!(me["email"], "bob@example.com");
        let providers: Vec<&str> = me["identities"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["provider"].as_str().unwrap())
            .collect();
        assert_eq!(providers, vec!["github", "google"]);
    }

    #[tokio::test]
    async fn test_unverified_email_match_needs_confirmation() {
        let adapter = StubAdapter::new(ProviderKind::GitHub).with_profile(
            "c1",
            profile(ProviderKind::GitHub, "1001", Some("bob@example.com"), false),
        );
        let (state, app) = setup(vec![adapter]).await;
        let (token, user_id) = register(&app, "bob@example.com", "hunter2").await;

        let issued = begin(&app, "github").await;
        let response = callback(&app, "github", "c1", &issued).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = read_json(response).await;
        assert_eq!(json["code"], "AMBIGUOUS_IDENTITY");
        let ticket = json["link_ticket"].as_str().unwrap().to_string();
        assert_eq!(user_count(&state).await, 1);

        // Redeeming requires proving ownership of the existing account.
        let anonymous = send(
            &app,
            json_request(
                Method::POST,
                "/auth/link/confirm",
                serde_json::json!({ "ticket": ticket }),
            ),
        )
        .await;
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let mut request = json_request(
            Method::POST,
            "/auth/link/confirm",
            serde_json::json!({ "ticket": ticket }),
        );
        request
            .headers_mut()
            .insert("authorization", format!("Bearer {}", token).parse().unwrap());
        let confirmed = send(&app, request).await;
        assert_eq!(confirmed.status(), StatusCode::OK);
        let json = read_json(confirmed).await;
        assert_eq!(json["user"]["id"], user_id.as_str());
        assert_eq!(json["user"]["identities"][0]["provider"], "github");

        // The next GitHub login goes straight through.
        let issued = begin(&app, "github").await;
        let again = read_json(callback(&app, "github", "c1", &issued).await).await;
        assert_eq!(again["user"]["id"], user_id.as_str());
    }

    #[tokio::test]
    async fn test_changed_verified_email_on_linked_identity_needs_confirmation() {
        let adapter = StubAdapter::new(ProviderKind::GitHub)
            .with_profile(
                "old",
                profile(ProviderKind::GitHub, "1001", Some("bob@example.com"), true),
            )
            .with_profile(
                "new",
                profile(ProviderKind::GitHub, "1001", Some("bob@work.example"), true),
            );
        let (state, app) = setup(vec![adapter]).await;

        let issued = begin(&app, "github").await;
        let first = read_json(callback(&app, "github", "old", &issued).await).await;
        let token = first["token"].as_str().unwrap().to_string();
        let user_id = first["user"]["id"].as_str().unwrap().to_string();

        let issued = begin(&app, "github").await;
        let response = callback(&app, "github", "new", &issued).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = read_json(response).await;
        assert_eq!(json["code"], "AMBIGUOUS_IDENTITY");
        let ticket = json["link_ticket"].as_str().unwrap().to_string();

        let mut request = json_request(
            Method::POST,
            "/auth/link/confirm",
            serde_json::json!({ "ticket": ticket }),
        );
        request
            .headers_mut()
            .insert("authorization", format!("Bearer {}", token).parse().unwrap());
        assert_eq!(send(&app, request).await.status(), StatusCode::OK);

        // Once confirmed, the same profile keeps signing in.
        for _ in 0..2 {
            let issued = begin(&app, "github").await;
            let response = callback(&app, "github", "new", &issued).await;
            assert_eq!(response.status(), StatusCode::OK);
            let json = read_json(response).await;
            assert_eq!(json["user"]["id"], user_id.as_str());
            assert_eq!(json["user"]["email"], "bob@example.com");
        }
        assert_eq!(user_count(&state).await, 1);
        assert_eq!(identity_count(&state).await, 1);
    }

    #[tokio::test]
    async fn test_callback_redirects_when_configured() {
        let adapter = StubAdapter::new(ProviderKind::GitHub)
            .with_profile("c1", profile(ProviderKind::GitHub, "1001", None, false));
        let config = AppConfig {
            login_redirect_url: Some("https://app.example/welcome".to_string()),
            ..quick_config()
        };
        let state = test_state(config, registry(vec![adapter])).await;
        let app = test_app(state);

        let issued = begin(&app, "github").await;
        let response = callback(&app, "github", "c1", &issued).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert!(response.headers().get(SET_COOKIE).is_some());
        let location = response.headers()[LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://app.example/welcome?token="));
    }
}
