//! Failure injection: circuit breaking and rate limiting through the
//! full gateway stack.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;

use edge_gateway::auth::CredentialAuthority;
use edge_gateway::services::orders::{self, OrdersState};
use edge_gateway::services::store::MemoryStore;
use edge_gateway::services;

/// Reserve an address nothing listens on.
fn dead_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

#[tokio::test]
async fn breaker_opens_on_dead_backend_and_isolates_it() {
    let dead = dead_addr();
    let stack = common::start_stack(move |config| {
        config.backends.orders_url = format!("http://{dead}");
        config.breaker.call_timeout_ms = 500;
        config.breaker.min_samples = 2;
        config.breaker.reset_timeout_ms = 60_000;
    })
    .await;
    let client = common::client();
    let token = stack.token_for("u1", "u1@example.com", &[]);

    // Every call yields the fallback, never a raw transport error.
    for _ in 0..3 {
        let res = client
            .get(stack.url("/v1/orders"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 503);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
    }

    // The orders breaker is open; the users breaker is untouched.
    let res = client.get(stack.url("/health")).send().await.unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["backends"]["orders"]["state"], "open");
    assert_eq!(body["data"]["backends"]["users"]["state"], "closed");

    let (user_token, _) = common::register_and_login(&stack, "isolated@example.com").await;
    let res = client
        .get(stack.url("/v1/users/profile"))
        .bearer_auth(&user_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    stack.shutdown.trigger();
}

#[tokio::test]
async fn breaker_recovers_through_half_open_probe() {
    let dead = dead_addr();
    let stack = common::start_stack(move |config| {
        config.backends.orders_url = format!("http://{dead}");
        config.breaker.call_timeout_ms = 500;
        config.breaker.min_samples = 2;
        config.breaker.reset_timeout_ms = 300;
    })
    .await;
    let client = common::client();
    let token = stack.token_for("u1", "u1@example.com", &[]);

    for _ in 0..2 {
        let res = client
            .get(stack.url("/v1/orders"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 503);
    }

    // Bring the orders service up on the address the gateway points at.
    let listener = TcpListener::bind(dead).await.unwrap();
    let authority = Arc::new(
        CredentialAuthority::new(common::TEST_SECRET, Duration::from_secs(600)).unwrap(),
    );
    let state = OrdersState::new(Arc::new(MemoryStore::new()), authority);
    let shutdown_rx = stack.shutdown.subscribe();
    tokio::spawn(async move {
        let _ = services::serve("orders", listener, orders::router(state), shutdown_rx).await;
    });

    // Wait out the cooldown, then the half-open probe should succeed.
    tokio::time::sleep(Duration::from_millis(400)).await;

    let res = client
        .get(stack.url("/v1/orders"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let res = client.get(stack.url("/health")).send().await.unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["backends"]["orders"]["state"], "closed");

    stack.shutdown.trigger();
}

#[tokio::test]
async fn strict_limit_denies_sixth_login_attempt() {
    let stack = common::start_stack(|_| {}).await;
    let client = common::client();

    // Five attempts pass the gate (they fail auth, which is irrelevant here).
    for _ in 0..5 {
        let res = client
            .post(stack.url("/v1/users/login"))
            .json(&serde_json::json!({"email": "x@example.com", "password": "wrong-password"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 401);
    }

    let res = client
        .post(stack.url("/v1/users/login"))
        .json(&serde_json::json!({"email": "x@example.com", "password": "wrong-password"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 429);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");

    stack.shutdown.trigger();
}

#[tokio::test]
async fn general_limit_gates_all_versioned_paths() {
    let stack = common::start_stack(|config| {
        config.rate_limit.max_requests = 3;
    })
    .await;
    let client = common::client();

    // Unauthenticated requests still consume the window: the gate runs
    // before credential verification.
    for _ in 0..3 {
        let res = client
            .get(stack.url("/v1/users/profile"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 401);
    }

    let res = client
        .get(stack.url("/v1/users/profile"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 429);

    // Health is outside the versioned API and stays reachable.
    let res = client.get(stack.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    stack.shutdown.trigger();
}

#[tokio::test]
async fn business_failures_do_not_open_the_breaker() {
    let stack = common::start_stack(|config| {
        config.breaker.min_samples = 2;
    })
    .await;
    let client = common::client();
    let token = stack.token_for("u1", "u1@example.com", &[]);

    // A stream of 404s from a healthy backend is not an availability signal.
    for _ in 0..6 {
        let res = client
            .get(stack.url("/v1/orders/no-such-order"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 404);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"]["code"], "ORDER_NOT_FOUND");
    }

    let res = client.get(stack.url("/health")).send().await.unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["backends"]["orders"]["state"], "closed");

    stack.shutdown.trigger();
}
