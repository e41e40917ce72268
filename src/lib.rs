//! Gateway and backend services for a small order platform.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌────────────────────────────────────────────────┐
//!                  │                   GATEWAY                       │
//!                  │                                                 │
//!  Client ─────────┼─▶ rate limiter ─▶ auth ─▶ forwarder/aggregator │
//!                  │                               │                 │
//!                  │                        circuit breaker          │
//!                  │                          (per backend)          │
//!                  └───────────────┬───────────────┬────────────────┘
//!                                  ▼               ▼
//!                          users service    orders service
//!                          (entity store)   (entity store)
//! ```
//!
//! Every boundary speaks the same `{success, data?, error?}` envelope; the
//! gateway relays envelopes verbatim and translates error codes to HTTP
//! statuses through a fixed table.

// Core subsystems
pub mod config;
pub mod envelope;
pub mod gateway;

// Collaborating services
pub mod auth;
pub mod services;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::GatewayConfig;
pub use envelope::Envelope;
pub use gateway::GatewayServer;
pub use lifecycle::Shutdown;
