//! Per-backend proxy: HTTP client plus failure-isolating breaker.
//!
//! # Responsibilities
//! - Hold the outbound client and one circuit breaker per backend
//! - Build the backend request from a [`ForwardSpec`]
//! - Classify transport failures vs completed (possibly failing) calls
//!
//! # Design Decisions
//! - A response that parses as an envelope is a completed call, whatever its
//!   HTTP status; a 5xx with a non-envelope body is a transport failure
//! - The proxy never surfaces a raw transport error: the breaker converts
//!   every failure into the fixed fallback envelope

use axum::{
    body::Body,
    http::{header, Request},
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::config::BreakerSettings;
use crate::envelope::Envelope;
use crate::gateway::forwarder::ForwardSpec;
use crate::gateway::middleware::REQUEST_ID_HEADER;
use crate::resilience::{BreakerSnapshot, CircuitBreaker, TransportError};

/// One downstream service reachable by URL, called through a breaker.
pub struct BackendProxy {
    name: &'static str,
    base_url: String,
    client: Client<HttpConnector, Body>,
    breaker: CircuitBreaker,
    max_body_bytes: usize,
}

impl BackendProxy {
    pub fn new(
        name: &'static str,
        base_url: &str,
        settings: BreakerSettings,
        max_body_bytes: usize,
    ) -> Result<Self, url::ParseError> {
        Url::parse(base_url)?;
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Ok(Self {
            name,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            breaker: CircuitBreaker::new(name, settings),
            max_body_bytes,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        self.breaker.snapshot()
    }

    /// Invoke the backend through the breaker. Always yields an envelope.
    pub async fn invoke(&self, spec: ForwardSpec) -> Envelope {
        self.breaker.invoke(|| self.dispatch(spec)).await
    }

    async fn dispatch(&self, spec: ForwardSpec) -> Result<Envelope, TransportError> {
        let uri = format!("{}{}", self.base_url, spec.path_and_query);

        let mut builder = Request::builder()
            .method(spec.method.clone())
            .uri(&uri)
            .header(REQUEST_ID_HEADER, spec.request_id.as_str());
        if let Some(auth) = &spec.authorization {
            builder = builder.header(header::AUTHORIZATION, auth.clone());
        }

        let body = match &spec.body {
            Some(bytes) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(bytes.clone())
            }
            None => Body::empty(),
        };

        let request = builder
            .body(body)
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = response.status();
        let bytes = axum::body::to_bytes(Body::new(response.into_body()), self.max_body_bytes)
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;

        match serde_json::from_slice::<Envelope>(&bytes) {
            Ok(envelope) => Ok(envelope),
            Err(_) if status.is_server_error() => Err(TransportError::BadGateway {
                status: status.as_u16(),
            }),
            // Framework-level rejections (malformed JSON, unsupported method)
            // come back without an envelope; they are client errors from a
            // live backend, not availability failures.
            Err(_) if status.is_client_error() => Ok(Envelope::err(
                crate::envelope::ErrorCode::ValidationError,
                format!("Backend rejected the request ({status})"),
            )),
            Err(e) => Err(TransportError::MalformedEnvelope(e.to_string())),
        }
    }
}
