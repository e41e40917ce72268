//! Uniform response envelope exchanged on every backend boundary.
//!
//! # Responsibilities
//! - Define the `{success, data?, error?}` wire shape
//! - Enforce the invariant: exactly one of `data`/`error`, selected by `success`
//! - Map backend error codes to HTTP statuses (total, static table)
//!
//! # Design Decisions
//! - Tagged union in code, raw struct on the wire (serde bridge)
//! - Relayed error codes stay verbatim strings so the gateway never rewrites
//!   a backend payload; `ErrorCode` is for envelopes the gateway produces
//! - Unmapped codes translate to 500

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error codes produced by the gateway and the backend services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationError,
    Unauthorized,
    InvalidToken,
    Forbidden,
    UserNotFound,
    OrderNotFound,
    UserExists,
    EmailExists,
    ServiceUnavailable,
    RateLimitExceeded,
    NotFound,
    InternalError,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::InvalidToken => "INVALID_TOKEN",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::UserNotFound => "USER_NOT_FOUND",
            ErrorCode::OrderNotFound => "ORDER_NOT_FOUND",
            ErrorCode::UserExists => "USER_EXISTS",
            ErrorCode::EmailExists => "EMAIL_EXISTS",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP status for an envelope error code. Total: unknown codes map to 500.
pub fn status_for(code: &str) -> StatusCode {
    match code {
        "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
        "UNAUTHORIZED" | "INVALID_TOKEN" => StatusCode::UNAUTHORIZED,
        "FORBIDDEN" => StatusCode::FORBIDDEN,
        "USER_NOT_FOUND" | "ORDER_NOT_FOUND" | "NOT_FOUND" => StatusCode::NOT_FOUND,
        "USER_EXISTS" | "EMAIL_EXISTS" => StatusCode::CONFLICT,
        "SERVICE_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
        "RATE_LIMIT_EXCEEDED" => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Error payload inside an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Uniform response envelope: either data or a coded error, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEnvelope", into = "RawEnvelope")]
pub enum Envelope {
    Ok(Value),
    Err(ErrorBody),
}

impl Envelope {
    pub fn ok(data: Value) -> Self {
        Envelope::Ok(data)
    }

    pub fn err(code: ErrorCode, message: impl Into<String>) -> Self {
        Envelope::Err(ErrorBody {
            code: code.as_str().to_string(),
            message: message.into(),
        })
    }

    /// The fixed fallback returned when a backend is unavailable.
    pub fn service_unavailable(backend: &str) -> Self {
        Self::err(
            ErrorCode::ServiceUnavailable,
            format!("{backend} service is temporarily unavailable"),
        )
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Envelope::Ok(_))
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            Envelope::Ok(_) => None,
            Envelope::Err(e) => Some(&e.code),
        }
    }

    /// HTTP status under the gateway's translation rules: 200 for success,
    /// the code table for failures.
    pub fn http_status(&self) -> StatusCode {
        match self {
            Envelope::Ok(_) => StatusCode::OK,
            Envelope::Err(e) => status_for(&e.code),
        }
    }
}

/// Wire shape used for (de)serialization.
#[derive(Serialize, Deserialize)]
struct RawEnvelope {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

impl From<Envelope> for RawEnvelope {
    fn from(env: Envelope) -> Self {
        match env {
            Envelope::Ok(data) => RawEnvelope {
                success: true,
                data: Some(data),
                error: None,
            },
            Envelope::Err(error) => RawEnvelope {
                success: false,
                data: None,
                error: Some(error),
            },
        }
    }
}

impl TryFrom<RawEnvelope> for Envelope {
    type Error = String;

    fn try_from(raw: RawEnvelope) -> Result<Self, String> {
        match (raw.success, raw.data, raw.error) {
            (true, data, None) => Ok(Envelope::Ok(data.unwrap_or(Value::Null))),
            (false, None, Some(error)) => Ok(Envelope::Err(error)),
            (true, _, Some(_)) => Err("success envelope carries an error field".into()),
            (false, _, _) => Err("failure envelope must carry exactly an error field".into()),
        }
    }
}
