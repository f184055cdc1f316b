// Configured provider adapters, keyed by provider

use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::github::GitHubAdapter;
use super::google::GoogleAdapter;
use super::linkedin::LinkedInAdapter;
use super::provider::{OAuthClientConfig, ProviderAdapter, ProviderKind};
use crate::common::AppConfig;

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One adapter for every provider whose client id and secret are both set.
    pub fn from_config(config: &AppConfig, http: &Client) -> Self {
        let mut registry = Self::new();

        for kind in ProviderKind::ALL {
            let Some(credentials) = config.provider_credentials(kind) else {
                continue;
            };
            let client = OAuthClientConfig {
                client_id: credentials.client_id.clone(),
                client_secret: credentials.client_secret.clone(),
                redirect_uri: config.callback_url(kind),
            };
            let adapter: Arc<dyn ProviderAdapter> = match kind {
                ProviderKind::GitHub => Arc::new(GitHubAdapter::new(http.clone(), client)),
                ProviderKind::Google => Arc::new(GoogleAdapter::new(http.clone(), client)),
                ProviderKind::LinkedIn => Arc::new(LinkedInAdapter::new(http.clone(), client)),
            };
            info!(provider = %kind, redirect_uri = %config.callback_url(kind), "OAuth provider configured");
            registry.register(adapter);
        }

        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&kind).cloned()
    }

    pub fn configured(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.adapters.contains_key(kind))
            .collect()
    }
}
