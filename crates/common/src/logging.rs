use crate::config::Environment;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter from `RUST_LOG`, or `default_directive` (e.g. "info", "scanner=debug") when unset.
pub(crate) fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Initialize the global subscriber: pretty output in development, JSON in production.
///
/// The OpenTelemetry layer is always attached; it only exports when a global
/// tracer provider has been installed (see [`crate::TelemetryGuard`]).
///
/// Returns an error if a global subscriber was already set.
pub fn setup_logging(environment: Environment, default_directive: &str) -> anyhow::Result<()> {
    let registry = tracing_subscriber::registry()
        .with(env_filter(default_directive))
        .with(tracing_opentelemetry::layer());

    match environment {
        Environment::Production => registry
            .with(tracing_subscriber::fmt::layer().json().with_level(true))
            .try_init()?,
        Environment::Development => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_ansi(true)
                    .with_target(false),
            )
            .try_init()?,
    }

    Ok(())
}
