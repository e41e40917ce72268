//! Credential verification middleware.
//!
//! Extracts the bearer credential, verifies it, and attaches the resulting
//! [`Identity`] to the request extensions for downstream handlers. Rejections
//! are surfaced as envelope responses through the standard code table.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::auth::token::{AuthError, CredentialAuthority};
use crate::envelope::Envelope;

/// Shared state for credential verification.
#[derive(Clone)]
pub struct AuthState {
    pub authority: Arc<CredentialAuthority>,
}

fn bearer_token(req: &Request<Body>) -> Result<&str, AuthError> {
    let value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredential)?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingCredential)
}

/// Require a valid bearer credential on the request.
pub async fn require_auth(
    State(state): State<AuthState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let verified = bearer_token(&req).and_then(|token| state.authority.verify(token));

    match verified {
        Ok(identity) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(err) => {
            tracing::debug!(path = %req.uri().path(), error = %err, "Credential rejected");
            let envelope = Envelope::err(err.code(), err.to_string());
            (envelope.http_status(), Json(envelope)).into_response()
        }
    }
}
