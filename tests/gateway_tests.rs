//! End-to-end tests for the gateway's forwarding, translation and
//! aggregation behavior against live backend services.

mod common;

use serde_json::{json, Value};

#[tokio::test]
async fn full_user_and_order_flow() {
    let stack = common::start_stack(|_| {}).await;
    let client = common::client();

    let (token, user_id) = common::register_and_login(&stack, "flow@example.com").await;

    // Create an order through the gateway. The gateway's success mapping is
    // always 200; the backend's own 201 stays on the backend surface.
    let res = client
        .post(stack.url("/v1/orders"))
        .bearer_auth(&token)
        .json(&json!({
            "items": [{"productId": "p1", "quantity": 2, "price": 100.0}],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "created");
    assert_eq!(body["data"]["totalAmount"], 200.0);
    let order_id = body["data"]["id"].as_str().unwrap().to_string();

    // List own orders.
    let res = client
        .get(stack.url("/v1/orders"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["pagination"]["total"], 1);

    // Update the order status.
    let res = client
        .put(stack.url(&format!("/v1/orders/{order_id}")))
        .bearer_auth(&token)
        .json(&json!({"status": "paid"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    // Composite view: user + orders + histogram.
    let res = client
        .get(stack.url(&format!("/v1/users/{user_id}/details")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["user"]["email"], "flow@example.com");
    assert_eq!(body["data"]["ordersSummary"]["total"], 1);
    assert_eq!(body["data"]["ordersSummary"]["byStatus"]["paid"], 1);

    stack.shutdown.trigger();
}

#[tokio::test]
async fn direct_backend_create_returns_201() {
    let stack = common::start_stack(|_| {}).await;
    let client = common::client();
    let token = stack.token_for("u-direct", "direct@example.com", &[]);

    let res = client
        .post(stack.orders_url("/v1/orders"))
        .bearer_auth(&token)
        .json(&json!({
            "items": [{"productId": "p1", "quantity": 1, "price": 10.0}],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], true);

    stack.shutdown.trigger();
}

#[tokio::test]
async fn validation_and_conflict_errors_are_translated() {
    let stack = common::start_stack(|_| {}).await;
    let client = common::client();

    // Bad email -> 400 VALIDATION_ERROR.
    let res = client
        .post(stack.url("/v1/users/register"))
        .json(&json!({"email": "nope", "password": "long-enough-pw"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    // Duplicate email -> 409 EMAIL_EXISTS.
    for expected in [200, 409] {
        let res = client
            .post(stack.url("/v1/users/register"))
            .json(&json!({
                "email": "dup@example.com",
                "password": "long-enough-pw",
                "name": "Dup",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), expected);
    }

    stack.shutdown.trigger();
}

#[tokio::test]
async fn credential_rejections_are_401() {
    let stack = common::start_stack(|_| {}).await;
    let client = common::client();

    let res = client.get(stack.url("/v1/orders")).send().await.unwrap();
    assert_eq!(res.status(), 401);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let res = client
        .get(stack.url("/v1/orders"))
        .bearer_auth("garbage-token")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "INVALID_TOKEN");

    stack.shutdown.trigger();
}

#[tokio::test]
async fn details_of_another_user_is_forbidden() {
    let stack = common::start_stack(|_| {}).await;
    let client = common::client();
    let (token, _) = common::register_and_login(&stack, "alice@example.com").await;

    let res = client
        .get(stack.url("/v1/users/someone-else/details"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    stack.shutdown.trigger();
}

#[tokio::test]
async fn admin_can_aggregate_any_user() {
    let stack = common::start_stack(|_| {}).await;
    let client = common::client();
    let (_, user_id) = common::register_and_login(&stack, "bob@example.com").await;

    let admin = stack
        .users_state
        .create_user("root@example.com", "admin-password", "Root", vec!["admin".into()])
        .unwrap();
    let token = stack.token_for(&admin.id, &admin.email, &["admin"]);

    let res = client
        .get(stack.url(&format!("/v1/users/{user_id}/details")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["user"]["id"], user_id.as_str());
    assert_eq!(body["data"]["ordersSummary"]["total"], 0);

    stack.shutdown.trigger();
}

#[tokio::test]
async fn unmatched_route_is_404_envelope() {
    let stack = common::start_stack(|_| {}).await;
    let client = common::client();

    let res = client.get(stack.url("/v2/nothing")).send().await.unwrap();
    assert_eq!(res.status(), 404);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    stack.shutdown.trigger();
}

#[tokio::test]
async fn request_id_is_generated_and_echoed() {
    let stack = common::start_stack(|_| {}).await;
    let client = common::client();

    let res = client.get(stack.url("/health")).send().await.unwrap();
    assert!(res.headers().contains_key("x-request-id"));

    let res = client
        .get(stack.url("/health"))
        .header("x-request-id", "trace-me-123")
        .send()
        .await
        .unwrap();
    assert_eq!(
        res.headers().get("x-request-id").unwrap().to_str().unwrap(),
        "trace-me-123"
    );

    stack.shutdown.trigger();
}

#[tokio::test]
async fn profile_roundtrip_through_gateway() {
    let stack = common::start_stack(|_| {}).await;
    let client = common::client();
    let (token, _) = common::register_and_login(&stack, "profile@example.com").await;

    let res = client
        .put(stack.url("/v1/users/profile"))
        .bearer_auth(&token)
        .json(&json!({"name": "Renamed"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let res = client
        .get(stack.url("/v1/users/profile"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["name"], "Renamed");

    stack.shutdown.trigger();
}

#[tokio::test]
async fn health_reports_both_breakers_closed() {
    let stack = common::start_stack(|_| {}).await;
    let client = common::client();

    let res = client.get(stack.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["backends"]["users"]["state"], "closed");
    assert_eq!(body["data"]["backends"]["orders"]["state"], "closed");

    let res = client.get(stack.url("/status")).send().await.unwrap();
    let body: Value = res.json().await.unwrap();
    assert!(body["data"]["process"]["uptimeSecs"].is_u64());

    stack.shutdown.trigger();
}
