//! Failure isolation for backend calls.

pub mod circuit_breaker;

pub use circuit_breaker::{BreakerEvent, BreakerSnapshot, BreakerState, CircuitBreaker};

/// Transport-level failure of one backend call. These are the only failures
/// that count against a breaker; business errors inside a well-formed
/// envelope do not.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("backend returned {status} with a non-envelope body")]
    BadGateway { status: u16 },

    #[error("backend returned a malformed envelope: {0}")]
    MalformedEnvelope(String),
}
