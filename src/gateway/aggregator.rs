//! Composite queries over both backends.
//!
//! # Responsibilities
//! - Authorize the caller before any backend is contacted
//! - Fan out the user-lookup and orders-lookup concurrently
//! - Wait for both to settle; never cancel one because of the other
//! - Degrade gracefully: a failed orders-lookup yields an empty order list,
//!   a failed user-lookup fails the whole operation
//!
//! # Design Decisions
//! - The two calls are independent, not atomic; partial success is a
//!   specified outcome, not an error
//! - `compose` is pure so the degradation rules are testable without I/O
//! - The status histogram uses a BTreeMap for deterministic JSON output

use std::collections::BTreeMap;

use axum::http::StatusCode;
use futures_util::future::join;
use serde_json::{json, Value};

use crate::auth::Identity;
use crate::envelope::{Envelope, ErrorCode};
use crate::gateway::forwarder::ForwardSpec;
use crate::gateway::proxy::BackendProxy;

/// Answer "user + their orders" for `user_id`.
///
/// Precondition: `identity` must be the target user or carry role `admin`;
/// otherwise neither backend is called.
pub async fn aggregate(
    users: &BackendProxy,
    orders: &BackendProxy,
    identity: &Identity,
    user_id: &str,
    request_id: &str,
    authorization: Option<axum::http::HeaderValue>,
) -> (StatusCode, Envelope) {
    if !identity.can_act_on(user_id) {
        tracing::debug!(
            request_id = %request_id,
            caller = %identity.id,
            target = %user_id,
            "Aggregate query denied"
        );
        let envelope = Envelope::err(ErrorCode::Forbidden, "You cannot view this user's details");
        return (envelope.http_status(), envelope);
    }

    let user_spec = ForwardSpec::get(
        format!("/v1/users/{user_id}"),
        request_id,
        authorization.clone(),
    );
    let orders_spec = ForwardSpec::get(
        format!("/v1/orders?userId={user_id}"),
        request_id,
        authorization,
    );

    // Both calls settle regardless of the other's outcome.
    let (user_env, orders_env) = join(users.invoke(user_spec), orders.invoke(orders_spec)).await;

    compose(user_env, orders_env)
}

/// Combine the two settled results into one response.
pub(crate) fn compose(user: Envelope, orders: Envelope) -> (StatusCode, Envelope) {
    let user_data = match user {
        Envelope::Ok(data) => data,
        Envelope::Err(_) => {
            let envelope = Envelope::err(ErrorCode::UserNotFound, "User not found");
            return (envelope.http_status(), envelope);
        }
    };

    // Secondary failure degrades to an empty order list.
    let order_list = match orders {
        Envelope::Ok(data) => data
            .get("orders")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        Envelope::Err(_) => Vec::new(),
    };

    let mut by_status: BTreeMap<String, u64> = BTreeMap::new();
    for order in &order_list {
        if let Some(status) = order.get("status").and_then(Value::as_str) {
            *by_status.entry(status.to_string()).or_insert(0) += 1;
        }
    }

    let body = Envelope::ok(json!({
        "user": user_data,
        "orders": order_list,
        "ordersSummary": {
            "total": order_list.len(),
            "byStatus": by_status,
        },
    }));
    (StatusCode::OK, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders_env() -> Envelope {
        Envelope::ok(json!({
            "orders": [
                {"id": "o1", "status": "created"},
                {"id": "o2", "status": "shipped"},
                {"id": "o3", "status": "created"},
            ],
            "pagination": {"total": 3},
        }))
    }

    #[test]
    fn user_failure_is_fatal_regardless_of_orders() {
        let user = Envelope::err(ErrorCode::UserNotFound, "gone");
        let (status, envelope) = compose(user.clone(), orders_env());
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(envelope.error_code(), Some("USER_NOT_FOUND"));

        let (status, _) = compose(user, Envelope::err(ErrorCode::ServiceUnavailable, "down"));
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn orders_failure_degrades_to_empty_list() {
        let user = Envelope::ok(json!({"id": "u1", "email": "a@example.com"}));
        let (status, envelope) = compose(user, Envelope::err(ErrorCode::ServiceUnavailable, "down"));
        assert_eq!(status, StatusCode::OK);

        let data = match envelope {
            Envelope::Ok(data) => data,
            Envelope::Err(_) => panic!("expected success envelope"),
        };
        assert_eq!(data["orders"], json!([]));
        assert_eq!(data["ordersSummary"]["total"], 0);
        assert_eq!(data["ordersSummary"]["byStatus"], json!({}));
    }

    #[test]
    fn computes_status_histogram() {
        let user = Envelope::ok(json!({"id": "u1"}));
        let (status, envelope) = compose(user, orders_env());
        assert_eq!(status, StatusCode::OK);

        let data = match envelope {
            Envelope::Ok(data) => data,
            Envelope::Err(_) => panic!("expected success envelope"),
        };
        assert_eq!(data["ordersSummary"]["total"], 3);
        assert_eq!(data["ordersSummary"]["byStatus"]["created"], 2);
        assert_eq!(data["ordersSummary"]["byStatus"]["shipped"], 1);
        assert_eq!(data["user"]["id"], "u1");
    }
}
