//! Configuration validation.
//!
//! Collects every violation instead of stopping at the first one, so a bad
//! config file can be fixed in a single pass.

use url::Url;

use crate::config::schema::GatewayConfig;

/// A single configuration violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    match Url::parse(value) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(ValidationError {
            field: field.to_string(),
            message: format!("unsupported scheme '{}'", url.scheme()),
        }),
        Err(e) => errors.push(ValidationError {
            field: field.to_string(),
            message: format!("invalid URL: {e}"),
        }),
    }
}

/// Validate a gateway configuration. Returns all violations found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError {
            field: "listener.bind_address".into(),
            message: format!("'{}' is not a socket address", config.listener.bind_address),
        });
    }

    check_url(&mut errors, "backends.users_url", &config.backends.users_url);
    check_url(&mut errors, "backends.orders_url", &config.backends.orders_url);

    let breaker = &config.breaker;
    if breaker.error_threshold_pct == 0 || breaker.error_threshold_pct > 100 {
        errors.push(ValidationError {
            field: "breaker.error_threshold_pct".into(),
            message: "must be in 1..=100".into(),
        });
    }
    if breaker.window_buckets == 0 {
        errors.push(ValidationError {
            field: "breaker.window_buckets".into(),
            message: "must be at least 1".into(),
        });
    }
    if breaker.rolling_window_ms == 0 || breaker.call_timeout_ms == 0 || breaker.reset_timeout_ms == 0 {
        errors.push(ValidationError {
            field: "breaker".into(),
            message: "timeouts and rolling window must be non-zero".into(),
        });
    }

    if config.rate_limit.max_requests == 0 || config.rate_limit.strict_max_requests == 0 {
        errors.push(ValidationError {
            field: "rate_limit".into(),
            message: "request limits must be non-zero".into(),
        });
    }

    if config.auth.secret.is_empty() {
        errors.push(ValidationError {
            field: "auth.secret".into(),
            message: "must not be empty".into(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
