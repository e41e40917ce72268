//! The gateway core: forwarding, aggregation and the HTTP surface.

pub mod aggregator;
pub mod forwarder;
pub mod middleware;
pub mod proxy;
pub mod server;

pub use forwarder::ForwardSpec;
pub use proxy::BackendProxy;
pub use server::{AppState, GatewayServer, ServerError};
