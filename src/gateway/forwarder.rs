//! Request forwarding: one inbound request becomes one backend call.
//!
//! # Responsibilities
//! - Build a [`ForwardSpec`] from the inbound request
//! - Invoke the matching backend through its breaker
//! - Translate the resulting envelope into an HTTP status (fixed code table)
//!
//! # Design Decisions
//! - Headers are reduced to the trace identifier and the bearer credential;
//!   nothing else crosses the boundary
//! - The envelope is relayed verbatim, no field rewriting
//! - Success is always 200 at the gateway; backends may use richer statuses
//!   (201 on create) on their own surface

use axum::{
    body::Bytes,
    http::{header, request::Parts, HeaderValue, Method, StatusCode},
};

use crate::envelope::Envelope;
use crate::gateway::middleware::REQUEST_ID_HEADER;
use crate::gateway::proxy::BackendProxy;

/// Ephemeral description of one proxied backend call.
#[derive(Debug, Clone)]
pub struct ForwardSpec {
    pub method: Method,
    /// Path plus query string, copied verbatim from the inbound request.
    pub path_and_query: String,
    pub request_id: String,
    pub authorization: Option<HeaderValue>,
    /// Buffered body for non-GET/HEAD methods.
    pub body: Option<Bytes>,
}

impl ForwardSpec {
    /// Build a spec from inbound request parts and an optionally buffered body.
    pub fn from_parts(parts: &Parts, body: Option<Bytes>) -> Self {
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());

        Self {
            method: parts.method.clone(),
            path_and_query,
            request_id: request_id(parts),
            authorization: parts.headers.get(header::AUTHORIZATION).cloned(),
            body: if parts.method == Method::GET || parts.method == Method::HEAD {
                None
            } else {
                body
            },
        }
    }

    /// A gateway-originated spec (aggregator sub-requests).
    pub fn get(path_and_query: impl Into<String>, request_id: &str, authorization: Option<HeaderValue>) -> Self {
        Self {
            method: Method::GET,
            path_and_query: path_and_query.into(),
            request_id: request_id.to_string(),
            authorization,
            body: None,
        }
    }
}

/// The inbound trace identifier; the request-id middleware guarantees one.
pub fn request_id(parts: &Parts) -> String {
    parts
        .headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Forward one call through a backend's breaker and translate the result.
pub async fn forward(proxy: &BackendProxy, spec: ForwardSpec) -> (StatusCode, Envelope) {
    let envelope = proxy.invoke(spec).await;
    (envelope.http_status(), envelope)
}
