//! Gateway-level request middleware.
//!
//! The trace identifier is attached as early as possible so every log line
//! and backend call within one inbound request can be correlated.

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Trace identifier header, generated when absent and echoed on responses.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Ensure every request carries an `x-request-id`, propagated to the response.
pub async fn propagate_request_id(mut req: Request<Body>, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    match HeaderValue::from_str(&id) {
        Ok(value) => {
            req.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
            let mut response = next.run(req).await;
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
            response
        }
        // Unparseable inbound id: replace it rather than fail the request.
        Err(_) => {
            let fresh = Uuid::new_v4().to_string();
            let value = HeaderValue::from_str(&fresh).unwrap_or(HeaderValue::from_static("unknown"));
            req.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
            let mut response = next.run(req).await;
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
            response
        }
    }
}
