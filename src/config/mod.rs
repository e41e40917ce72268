//! Configuration management.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AuthConfig, BackendsConfig, BreakerSettings, GatewayConfig, ListenerConfig,
    ObservabilityConfig, RateLimitConfig, TimeoutConfig,
};
