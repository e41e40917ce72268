//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML config files.
//! Every section has sane defaults so the gateway can start with no file at
//! all (useful for tests and local runs).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the gateway process.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Downstream backend service URLs.
    pub backends: BackendsConfig,

    /// Circuit breaker settings, applied to each backend instance.
    pub breaker: BreakerSettings,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Credential verification settings.
    pub auth: AuthConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// The two downstream services the gateway fronts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendsConfig {
    /// Base URL of the users service.
    pub users_url: String,

    /// Base URL of the orders service.
    pub orders_url: String,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            users_url: "http://127.0.0.1:7101".to_string(),
            orders_url: "http://127.0.0.1:7102".to_string(),
        }
    }
}

/// Circuit breaker settings. One breaker instance is created per backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// Maximum wait for one backend call, in milliseconds.
    pub call_timeout_ms: u64,

    /// Rolling error rate (percent) at which the breaker opens.
    pub error_threshold_pct: u8,

    /// Cooldown before probing an open backend again, in milliseconds.
    pub reset_timeout_ms: u64,

    /// Rolling window over which the error rate is computed, in milliseconds.
    pub rolling_window_ms: u64,

    /// Number of buckets the rolling window is divided into.
    pub window_buckets: usize,

    /// Minimum calls in the window before the error rate is meaningful.
    pub min_samples: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            call_timeout_ms: 5_000,
            error_threshold_pct: 50,
            reset_timeout_ms: 30_000,
            rolling_window_ms: 10_000,
            window_buckets: 10,
            min_samples: 5,
        }
    }
}

impl BreakerSettings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn rolling_window(&self) -> Duration {
        Duration::from_millis(self.rolling_window_ms)
    }
}

/// Rate limiting configuration. Two window gates: a general one for all
/// versioned API paths and a strict one for registration/login.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Window length in seconds.
    pub window_secs: u64,

    /// Maximum requests per client within the window (general gate).
    pub max_requests: u32,

    /// Maximum requests per client within the window (strict gate).
    pub strict_max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 900,
            max_requests: 100,
            strict_max_requests: 5,
        }
    }
}

/// Credential settings. The same secret is shared with the backend services,
/// which verify bearer credentials independently of the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for signing and verifying tokens.
    pub secret: String,

    /// Token lifetime in seconds.
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            // WARNING: This is a placeholder! Change this in production.
            secret: "CHANGE_ME_IN_PRODUCTION".to_string(),
            token_ttl_secs: 3_600,
        }
    }
}

/// Timeout and size limits for the inbound side.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time budget for one inbound request, in seconds.
    pub request_secs: u64,

    /// Maximum buffered body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
