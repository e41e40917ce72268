//! Orders backend service.
//!
//! Owns the order store and business rules: creation with total computation,
//! listing with owner scoping, status transitions and deletion. Exposes the
//! uniform JSON envelope and verifies bearer credentials independently.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::auth::{require_auth, AuthState, CredentialAuthority, Identity};
use crate::envelope::{Envelope, ErrorCode};
use crate::services::store::EntityStore;

/// Order lifecycle states accepted on update.
pub const ORDER_STATUSES: &[&str] = &["created", "paid", "shipped", "delivered", "cancelled"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: String,
    pub quantity: u32,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub items: Vec<OrderItem>,
    pub total_amount: f64,
    pub status: String,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Shared state of the orders service.
#[derive(Clone)]
pub struct OrdersState {
    pub store: Arc<dyn EntityStore<Order>>,
    pub authority: Arc<CredentialAuthority>,
}

impl OrdersState {
    pub fn new(store: Arc<dyn EntityStore<Order>>, authority: Arc<CredentialAuthority>) -> Self {
        Self { store, authority }
    }
}

/// Build the orders service router. Every route requires a credential.
pub fn router(state: OrdersState) -> Router {
    let auth_state = AuthState {
        authority: state.authority.clone(),
    };

    Router::new()
        .route("/v1/orders", get(list_orders).post(create_order))
        .route(
            "/v1/orders/{id}",
            get(get_order).put(update_order).delete(delete_order),
        )
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth))
        .fallback(not_found)
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct CreateOrderRequest {
    items: Vec<OrderItem>,
}

#[derive(Debug, Deserialize)]
struct UpdateOrderRequest {
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    user_id: Option<String>,
}

async fn create_order(
    State(state): State<OrdersState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<CreateOrderRequest>,
) -> Response {
    if let Err(message) = validate_items(&request.items) {
        return envelope_response(Envelope::err(ErrorCode::ValidationError, message));
    }

    let total_amount = request
        .items
        .iter()
        .map(|item| f64::from(item.quantity) * item.price)
        .sum();

    let now = unix_now();
    let order = Order {
        id: Uuid::new_v4().to_string(),
        user_id: identity.id.clone(),
        items: request.items,
        total_amount,
        status: "created".to_string(),
        created_at: now,
        updated_at: now,
    };
    state.store.put(&order.id, order.clone());

    tracing::info!(order_id = %order.id, user_id = %order.user_id, "Order created");
    // Created resources answer 201 on the service's own surface.
    (StatusCode::CREATED, Json(Envelope::ok(json!(order)))).into_response()
}

async fn list_orders(
    State(state): State<OrdersState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ListQuery>,
) -> Response {
    // Non-admin callers only ever see their own orders.
    let scope = if identity.is_admin() {
        query.user_id
    } else {
        Some(identity.id.clone())
    };

    let mut orders: Vec<Order> = state
        .store
        .list()
        .into_iter()
        .filter(|order| scope.as_deref().map_or(true, |id| order.user_id == id))
        .collect();
    orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    envelope_response(Envelope::ok(json!({
        "orders": orders,
        "pagination": {"total": orders.len()},
    })))
}

async fn get_order(
    State(state): State<OrdersState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Response {
    match state.store.get(&id) {
        Some(order) if identity.can_act_on(&order.user_id) => {
            envelope_response(Envelope::ok(json!(order)))
        }
        Some(_) => envelope_response(Envelope::err(ErrorCode::Forbidden, "Not your order")),
        None => envelope_response(Envelope::err(ErrorCode::OrderNotFound, "Order not found")),
    }
}

async fn update_order(
    State(state): State<OrdersState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(request): Json<UpdateOrderRequest>,
) -> Response {
    if !ORDER_STATUSES.contains(&request.status.as_str()) {
        return envelope_response(Envelope::err(
            ErrorCode::ValidationError,
            format!("Status must be one of: {}", ORDER_STATUSES.join(", ")),
        ));
    }

    match state.store.get(&id) {
        Some(mut order) if identity.can_act_on(&order.user_id) => {
            order.status = request.status;
            order.updated_at = unix_now();
            state.store.put(&order.id, order.clone());
            envelope_response(Envelope::ok(json!(order)))
        }
        Some(_) => envelope_response(Envelope::err(ErrorCode::Forbidden, "Not your order")),
        None => envelope_response(Envelope::err(ErrorCode::OrderNotFound, "Order not found")),
    }
}

async fn delete_order(
    State(state): State<OrdersState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Response {
    match state.store.get(&id) {
        Some(order) if identity.can_act_on(&order.user_id) => {
            state.store.remove(&id);
            envelope_response(Envelope::ok(json!({"deleted": true, "id": id})))
        }
        Some(_) => envelope_response(Envelope::err(ErrorCode::Forbidden, "Not your order")),
        None => envelope_response(Envelope::err(ErrorCode::OrderNotFound, "Order not found")),
    }
}

async fn not_found() -> Response {
    envelope_response(Envelope::err(ErrorCode::NotFound, "Resource not found"))
}

fn envelope_response(envelope: Envelope) -> Response {
    (envelope.http_status(), Json(envelope)).into_response()
}

fn validate_items(items: &[OrderItem]) -> Result<(), &'static str> {
    if items.is_empty() {
        return Err("Order must contain at least one item");
    }
    for item in items {
        if item.product_id.is_empty() {
            return Err("Every item needs a productId");
        }
        if item.quantity == 0 {
            return Err("Item quantity must be at least 1");
        }
        if item.price < 0.0 {
            return Err("Item price must not be negative");
        }
    }
    Ok(())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
