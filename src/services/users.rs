//! Users backend service.
//!
//! Owns the user store and business rules: registration, login, profile
//! management and lookups. Exposes the uniform JSON envelope and verifies
//! bearer credentials independently of the gateway.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use rand::RngCore;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::auth::{require_auth, AuthState, CredentialAuthority, Identity};
use crate::envelope::{Envelope, ErrorCode};
use crate::services::store::EntityStore;

/// A stored user. The password digest never leaves the service.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub roles: Vec<String>,
    pub password_digest: String,
    pub created_at: u64,
}

impl User {
    /// Public projection carried in envelopes.
    pub fn public(&self) -> Value {
        json!({
            "id": self.id,
            "email": self.email,
            "name": self.name,
            "roles": self.roles,
            "createdAt": self.created_at,
        })
    }
}

/// Shared state of the users service.
#[derive(Clone)]
pub struct UsersState {
    pub store: Arc<dyn EntityStore<User>>,
    pub authority: Arc<CredentialAuthority>,
}

impl UsersState {
    pub fn new(store: Arc<dyn EntityStore<User>>, authority: Arc<CredentialAuthority>) -> Self {
        Self { store, authority }
    }

    fn find_by_email(&self, email: &str) -> Option<User> {
        self.store.list().into_iter().find(|u| u.email == email)
    }

    /// Create a user directly. Used by the register handler and by test
    /// setups that need to seed privileged accounts.
    pub fn create_user(
        &self,
        email: &str,
        password: &str,
        name: &str,
        roles: Vec<String>,
    ) -> Result<User, ErrorCode> {
        if self.find_by_email(email).is_some() {
            return Err(ErrorCode::EmailExists);
        }
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            name: name.to_string(),
            roles,
            password_digest: digest_password(password),
            created_at: unix_now(),
        };
        self.store.put(&user.id, user.clone());
        Ok(user)
    }
}

/// Build the users service router.
pub fn router(state: UsersState) -> Router {
    let auth_state = AuthState {
        authority: state.authority.clone(),
    };

    let protected = Router::new()
        .route("/v1/users/profile", get(get_profile).put(update_profile))
        .route("/v1/users", get(list_users))
        .route("/v1/users/{id}", get(get_user))
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth));

    Router::new()
        .route("/v1/users/register", post(register))
        .route("/v1/users/login", post(login))
        .merge(protected)
        .fallback(not_found)
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    email: String,
    password: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct UpdateProfileRequest {
    name: String,
}

async fn register(
    State(state): State<UsersState>,
    Json(request): Json<RegisterRequest>,
) -> Response {
    if let Err(message) = validate_registration(&request) {
        return envelope_response(Envelope::err(ErrorCode::ValidationError, message));
    }

    match state.create_user(
        &request.email,
        &request.password,
        &request.name,
        vec!["customer".to_string()],
    ) {
        Ok(user) => {
            tracing::info!(user_id = %user.id, "User registered");
            (StatusCode::CREATED, Json(Envelope::ok(user.public()))).into_response()
        }
        Err(code) => envelope_response(Envelope::err(code, "Email is already registered")),
    }
}

async fn login(State(state): State<UsersState>, Json(request): Json<LoginRequest>) -> Response {
    let user = match state.find_by_email(&request.email) {
        Some(user) if verify_password(&request.password, &user.password_digest) => user,
        _ => {
            return envelope_response(Envelope::err(
                ErrorCode::Unauthorized,
                "Invalid email or password",
            ));
        }
    };

    match state.authority.issue(&user.id, &user.email, &user.roles) {
        Ok(token) => envelope_response(Envelope::ok(json!({
            "token": token,
            "user": user.public(),
        }))),
        Err(e) => {
            tracing::error!(error = %e, "Token issuance failed");
            envelope_response(Envelope::err(ErrorCode::InternalError, "Could not issue token"))
        }
    }
}

async fn get_profile(
    State(state): State<UsersState>,
    Extension(identity): Extension<Identity>,
) -> Response {
    match state.store.get(&identity.id) {
        Some(user) => envelope_response(Envelope::ok(user.public())),
        None => envelope_response(Envelope::err(ErrorCode::UserNotFound, "User not found")),
    }
}

async fn update_profile(
    State(state): State<UsersState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<UpdateProfileRequest>,
) -> Response {
    if request.name.trim().is_empty() {
        return envelope_response(Envelope::err(ErrorCode::ValidationError, "Name must not be empty"));
    }

    match state.store.get(&identity.id) {
        Some(mut user) => {
            user.name = request.name;
            state.store.put(&user.id, user.clone());
            envelope_response(Envelope::ok(user.public()))
        }
        None => envelope_response(Envelope::err(ErrorCode::UserNotFound, "User not found")),
    }
}

async fn list_users(
    State(state): State<UsersState>,
    Extension(identity): Extension<Identity>,
) -> Response {
    if !identity.is_admin() {
        return envelope_response(Envelope::err(ErrorCode::Forbidden, "Admin role required"));
    }

    let users: Vec<Value> = state.store.list().iter().map(User::public).collect();
    envelope_response(Envelope::ok(json!({
        "users": users,
        "pagination": {"total": users.len()},
    })))
}

async fn get_user(
    State(state): State<UsersState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Response {
    if !identity.can_act_on(&id) {
        return envelope_response(Envelope::err(ErrorCode::Forbidden, "You cannot view this user"));
    }

    match state.store.get(&id) {
        Some(user) => envelope_response(Envelope::ok(user.public())),
        None => envelope_response(Envelope::err(ErrorCode::UserNotFound, "User not found")),
    }
}

async fn not_found() -> Response {
    envelope_response(Envelope::err(ErrorCode::NotFound, "Resource not found"))
}

fn envelope_response(envelope: Envelope) -> Response {
    (envelope.http_status(), Json(envelope)).into_response()
}

fn validate_registration(request: &RegisterRequest) -> Result<(), &'static str> {
    if !request.email.contains('@') || request.email.len() < 3 {
        return Err("A valid email address is required");
    }
    if request.password.len() < 8 {
        return Err("Password must be at least 8 characters");
    }
    Ok(())
}

/// Salted SHA-256 digest, stored as `salt$hex`.
fn digest_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt_hex = to_hex(&salt);
    format!("{salt_hex}${}", hash_with_salt(&salt_hex, password))
}

fn verify_password(password: &str, digest: &str) -> bool {
    match digest.split_once('$') {
        Some((salt_hex, expected)) => hash_with_salt(salt_hex, password) == expected,
        None => false,
    }
}

fn hash_with_salt(salt_hex: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt_hex.as_bytes());
    hasher.update(password.as_bytes());
    to_hex(&hasher.finalize())
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
