//! Gateway HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router with the full route table
//! - Wire up middleware (request id, rate limits, auth, timeout, tracing)
//! - Dispatch protected routes to the forwarder or the aggregator
//! - Expose /health and /status from the breaker snapshots
//!
//! Control flow per request: rate limiter → (if protected) credential
//! verification → forwarder or aggregator → circuit breaker → backend.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::auth::{require_auth, AuthState, CredentialAuthority, Identity};
use crate::config::GatewayConfig;
use crate::envelope::{Envelope, ErrorCode};
use crate::gateway::aggregator;
use crate::gateway::forwarder::{self, ForwardSpec};
use crate::gateway::middleware::propagate_request_id;
use crate::gateway::proxy::BackendProxy;
use crate::lifecycle::ProcessStats;
use crate::observability::metrics;
use crate::security::{rate_limit_middleware, RateLimiter};

/// Errors while assembling the gateway.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid backend URL: {0}")]
    BackendUrl(#[from] url::ParseError),

    #[error("credential authority setup failed: {0}")]
    Auth(#[from] crate::auth::AuthError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<BackendProxy>,
    pub orders: Arc<BackendProxy>,
    pub started_at: Instant,
    pub max_body_bytes: usize,
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
    state: AppState,
}

impl GatewayServer {
    /// Assemble the gateway from its configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, ServerError> {
        let authority = Arc::new(CredentialAuthority::new(
            &config.auth.secret,
            Duration::from_secs(config.auth.token_ttl_secs),
        )?);

        let max_body_bytes = config.timeouts.max_body_bytes;
        let users = Arc::new(BackendProxy::new(
            "users",
            &config.backends.users_url,
            config.breaker.clone(),
            max_body_bytes,
        )?);
        let orders = Arc::new(BackendProxy::new(
            "orders",
            &config.backends.orders_url,
            config.breaker.clone(),
            max_body_bytes,
        )?);

        let state = AppState {
            users,
            orders,
            started_at: Instant::now(),
            max_body_bytes,
        };

        let router = build_router(&config, state.clone(), authority);
        Ok(Self { router, state })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the server until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Gateway listening");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(crate::lifecycle::shutdown::wait(shutdown))
            .await?;

        tracing::info!("Gateway stopped");
        Ok(())
    }
}

fn build_router(
    config: &GatewayConfig,
    state: AppState,
    authority: Arc<CredentialAuthority>,
) -> Router {
    let window = Duration::from_secs(config.rate_limit.window_secs);
    let general = Arc::new(RateLimiter::new(
        "general",
        window,
        config.rate_limit.max_requests,
    ));
    let strict = Arc::new(RateLimiter::new(
        "strict",
        window,
        config.rate_limit.strict_max_requests,
    ));
    let auth_state = AuthState { authority };

    // Registration and login: strictly limited, no credential required.
    let public = Router::new()
        .route("/v1/users/register", post(forward_users))
        .route("/v1/users/login", post(forward_users))
        .route_layer(middleware::from_fn_with_state(
            strict,
            rate_limit_middleware,
        ));

    let protected = Router::new()
        .route("/v1/users/profile", get(forward_users).put(forward_users))
        .route("/v1/users", get(forward_users))
        .route("/v1/users/{id}", get(forward_users))
        .route("/v1/users/{id}/details", get(user_details))
        .route("/v1/orders", post(forward_orders).get(forward_orders))
        .route(
            "/v1/orders/{id}",
            get(forward_orders).put(forward_orders).delete(forward_orders),
        )
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth));

    // The general limit gates every versioned API path.
    let api = Router::new()
        .merge(public)
        .merge(protected)
        .route_layer(middleware::from_fn_with_state(
            general,
            rate_limit_middleware,
        ));

    Router::new()
        .merge(api)
        .route("/health", get(health))
        .route("/status", get(status))
        .fallback(not_found)
        .with_state(state)
        .layer(middleware::from_fn(propagate_request_id))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.timeouts.request_secs,
        )))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
}

async fn forward_users(State(state): State<AppState>, request: Request<Body>) -> Response {
    proxy_request(&state.users, state.max_body_bytes, request).await
}

async fn forward_orders(State(state): State<AppState>, request: Request<Body>) -> Response {
    proxy_request(&state.orders, state.max_body_bytes, request).await
}

/// Forward one inbound request to a backend and relay the envelope.
async fn proxy_request(
    proxy: &BackendProxy,
    max_body_bytes: usize,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let (parts, body) = request.into_parts();
    let method = parts.method.to_string();
    let request_id = forwarder::request_id(&parts);

    let body_bytes = match axum::body::to_bytes(body, max_body_bytes).await {
        Ok(bytes) if !bytes.is_empty() => Some(bytes),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Failed to buffer request body");
            let envelope = Envelope::err(ErrorCode::ValidationError, "Request body unreadable or too large");
            return (envelope.http_status(), Json(envelope)).into_response();
        }
    };

    let spec = ForwardSpec::from_parts(&parts, body_bytes);
    tracing::debug!(
        request_id = %request_id,
        backend = proxy.name(),
        method = %spec.method,
        path = %spec.path_and_query,
        "Forwarding request"
    );

    let (status, envelope) = forwarder::forward(proxy, spec).await;
    metrics::record_request(&method, status.as_u16(), proxy.name(), start);
    (status, Json(envelope)).into_response()
}

/// Composite user + orders view.
async fn user_details(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(identity): Extension<Identity>,
    headers: HeaderMap,
) -> Response {
    let start = Instant::now();
    let request_id = headers
        .get(crate::gateway::middleware::REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let authorization = headers.get(header::AUTHORIZATION).cloned();

    let (status, envelope) = aggregator::aggregate(
        &state.users,
        &state.orders,
        &identity,
        &user_id,
        &request_id,
        authorization,
    )
    .await;

    metrics::record_request("GET", status.as_u16(), "aggregate", start);
    (status, Json(envelope)).into_response()
}

/// Breaker states and rolling stats for both backends.
async fn health(State(state): State<AppState>) -> Json<Envelope> {
    Json(Envelope::ok(serde_json::json!({
        "backends": {
            "users": state.users.snapshot(),
            "orders": state.orders.snapshot(),
        },
    })))
}

/// Health plus process uptime and memory.
async fn status(State(state): State<AppState>) -> Json<Envelope> {
    Json(Envelope::ok(serde_json::json!({
        "backends": {
            "users": state.users.snapshot(),
            "orders": state.orders.snapshot(),
        },
        "process": ProcessStats::collect(state.started_at),
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

async fn not_found() -> Response {
    let envelope = Envelope::err(ErrorCode::NotFound, "Resource not found");
    (StatusCode::NOT_FOUND, Json(envelope)).into_response()
}

/// Outermost boundary for programming errors: log and keep serving.
fn handle_panic(err: Box<dyn std::any::Any + Send + 'static>) -> axum::http::Response<Body> {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(error = %detail, "Request handler panicked");

    let envelope = Envelope::err(ErrorCode::InternalError, "Internal server error");
    let body = serde_json::to_string(&envelope)
        .unwrap_or_else(|_| r#"{"success":false,"error":{"code":"INTERNAL_ERROR","message":"Internal server error"}}"#.to_string());

    axum::http::Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_default()
}
