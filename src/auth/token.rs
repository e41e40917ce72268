//! Bearer credential issuance and verification.
//!
//! Tokens are HMAC-SHA256 signed JWTs carrying the subject, email and role
//! set. Verification is pure and local: no session store is consulted, so
//! the gateway and each backend service can verify independently.

use std::collections::HashSet;
use std::time::{Duration, SystemTime};

use hmac::{Hmac, Mac};
use jwt::{SignWithKey, VerifyWithKey};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::envelope::ErrorCode;

/// Claims carried inside a signed token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: String,

    /// Email of the subject.
    pub email: String,

    /// Role set of the subject.
    pub roles: Vec<String>,

    /// Issued at (Unix timestamp).
    pub iat: u64,

    /// Expiration time (Unix timestamp).
    pub exp: u64,

    /// Token ID.
    pub jti: String,
}

/// The identity a verified credential yields. Lifetime: one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub roles: HashSet<String>,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.roles.contains("admin")
    }

    /// True if this identity may act on resources owned by `user_id`.
    pub fn can_act_on(&self, user_id: &str) -> bool {
        self.id == user_id || self.is_admin()
    }
}

/// Credential verification failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer credential")]
    MissingCredential,

    #[error("invalid credential")]
    InvalidToken,

    #[error("credential expired")]
    Expired,
}

impl AuthError {
    /// Envelope error code for this rejection.
    pub fn code(&self) -> ErrorCode {
        match self {
            AuthError::MissingCredential => ErrorCode::Unauthorized,
            AuthError::InvalidToken | AuthError::Expired => ErrorCode::InvalidToken,
        }
    }
}

/// Issues and verifies bearer credentials with a shared HMAC secret.
pub struct CredentialAuthority {
    key: Hmac<Sha256>,
    ttl: Duration,
}

impl CredentialAuthority {
    /// Create an authority from a shared secret.
    ///
    /// Returns an error only if the secret is empty (HMAC accepts any
    /// non-empty key length).
    pub fn new(secret: &str, ttl: Duration) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        let key = Hmac::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
        Ok(Self { key, ttl })
    }

    /// Issue a signed token for a user.
    pub fn issue(&self, id: &str, email: &str, roles: &[String]) -> Result<String, AuthError> {
        let now = unix_now();
        let jti: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();

        let claims = Claims {
            sub: id.to_string(),
            email: email.to_string(),
            roles: roles.to_vec(),
            iat: now,
            exp: now + self.ttl.as_secs(),
            jti,
        };

        claims.sign_with_key(&self.key).map_err(|_| AuthError::InvalidToken)
    }

    /// Verify a token and yield the identity it encodes.
    pub fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let claims: Claims = token
            .verify_with_key(&self.key)
            .map_err(|_| AuthError::InvalidToken)?;

        if claims.exp <= unix_now() {
            return Err(AuthError::Expired);
        }

        Ok(Identity {
            id: claims.sub,
            email: claims.email,
            roles: claims.roles.into_iter().collect(),
        })
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority(ttl_secs: u64) -> CredentialAuthority {
        CredentialAuthority::new("test-secret", Duration::from_secs(ttl_secs)).unwrap()
    }

    #[test]
    fn issue_then_verify_roundtrip() {
        let auth = authority(60);
        let token = auth
            .issue("u1", "a@example.com", &["customer".into()])
            .unwrap();

        let identity = auth.verify(&token).unwrap();
        assert_eq!(identity.id, "u1");
        assert_eq!(identity.email, "a@example.com");
        assert!(identity.roles.contains("customer"));
        assert!(!identity.is_admin());
    }

    #[test]
    fn rejects_expired_token() {
        let auth = authority(0);
        let token = auth.issue("u1", "a@example.com", &[]).unwrap();
        assert_eq!(auth.verify(&token), Err(AuthError::Expired));
    }

    #[test]
    fn rejects_garbage_and_foreign_signatures() {
        let auth = authority(60);
        assert_eq!(auth.verify("not-a-token"), Err(AuthError::InvalidToken));

        let other = CredentialAuthority::new("other-secret", Duration::from_secs(60)).unwrap();
        let token = other.issue("u1", "a@example.com", &[]).unwrap();
        assert_eq!(auth.verify(&token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn admin_can_act_on_anyone() {
        let auth = authority(60);
        let token = auth
            .issue("admin-1", "root@example.com", &["admin".into()])
            .unwrap();
        let identity = auth.verify(&token).unwrap();
        assert!(identity.can_act_on("someone-else"));
    }
}
