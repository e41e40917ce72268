//! Credential issuance, verification and the request-level middleware.

pub mod middleware;
pub mod token;

pub use middleware::{require_auth, AuthState};
pub use token::{AuthError, Claims, CredentialAuthority, Identity};
