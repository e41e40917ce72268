//! Observability: metrics exposition and structured logging helpers.

pub mod metrics;

/// Initialize the tracing subscriber with an env-filter fallback.
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
