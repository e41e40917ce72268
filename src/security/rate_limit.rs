//! Request-rate gating per client address.
//!
//! Fixed-window counter: the count resets when the window rolls over. Two
//! instances run in front of the gateway routes, a general one for all
//! versioned API paths and a strict one for registration/login. Once a
//! client is over its limit the counter stops advancing, so a flood of
//! denied requests cannot extend the penalty.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;

use crate::envelope::{Envelope, ErrorCode};
use crate::observability::metrics;

#[derive(Debug, Clone, Copy)]
struct WindowSlot {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter keyed by client address.
pub struct RateLimiter {
    name: &'static str,
    window: Duration,
    max_requests: u32,
    slots: DashMap<String, WindowSlot>,
}

impl RateLimiter {
    pub fn new(name: &'static str, window: Duration, max_requests: u32) -> Self {
        Self {
            name,
            window,
            max_requests,
            slots: DashMap::new(),
        }
    }

    /// Check whether a request from `key` is allowed right now.
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut slot = self.slots.entry(key.to_string()).or_insert(WindowSlot {
            started: now,
            count: 0,
        });

        if now.duration_since(slot.started) >= self.window {
            slot.started = now;
            slot.count = 0;
        }

        if slot.count >= self.max_requests {
            return false;
        }
        slot.count += 1;
        true
    }
}

/// Middleware applying one limiter instance to a route group.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = addr.ip().to_string();

    if limiter.check(&key) {
        next.run(request).await
    } else {
        tracing::warn!(client = %key, limiter = limiter.name, "Rate limit exceeded");
        metrics::record_rate_limited(limiter.name);
        let envelope = Envelope::err(
            ErrorCode::RateLimitExceeded,
            "Too many requests, please try again later",
        );
        (envelope.http_status(), Json(envelope)).into_response()
    }
}
