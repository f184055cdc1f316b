// Logging and error tracking setup

use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::common::AppConfig;

/// Install the global subscriber and, when `SENTRY_DSN` is set, the Sentry
/// client. The returned guard must live until shutdown so queued events flush.
pub fn init(config: &AppConfig) -> Option<sentry::ClientInitGuard> {
    let guard = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                environment: Some(config.environment.clone().into()),
                traces_sample_rate: 0.0,
                ..Default::default()
            },
        ))
    });

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(guard.as_ref().map(|_| sentry_tracing::layer()))
        .init();

    match &guard {
        Some(_) => info!(environment = %config.environment, "Sentry initialized successfully"),
        None => info!("Sentry DSN not configured"),
    }

    guard
}
