//! Shared utilities for integration testing.
//!
//! Spins up the users service, the orders service and the gateway on
//! ephemeral ports, all in-process, and drives them with a real HTTP client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use edge_gateway::auth::CredentialAuthority;
use edge_gateway::config::GatewayConfig;
use edge_gateway::lifecycle::Shutdown;
use edge_gateway::services::orders::{self, OrdersState};
use edge_gateway::services::store::MemoryStore;
use edge_gateway::services::users::{self, UsersState};
use edge_gateway::services;
use edge_gateway::GatewayServer;

pub const TEST_SECRET: &str = "integration-test-secret";

pub struct TestStack {
    pub gateway: SocketAddr,
    pub users_addr: SocketAddr,
    pub orders_addr: SocketAddr,
    pub authority: Arc<CredentialAuthority>,
    pub users_state: UsersState,
    pub shutdown: Shutdown,
}

impl TestStack {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.gateway, path)
    }

    pub fn orders_url(&self, path: &str) -> String {
        format!("http://{}{}", self.orders_addr, path)
    }

    /// Issue a token without going through the login flow.
    pub fn token_for(&self, id: &str, email: &str, roles: &[&str]) -> String {
        let roles: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
        self.authority.issue(id, email, &roles).unwrap()
    }
}

/// Start the full stack. `tweak` may adjust the gateway configuration
/// (breaker settings, limits, backend URLs) before the server is built.
pub async fn start_stack<F>(tweak: F) -> TestStack
where
    F: FnOnce(&mut GatewayConfig),
{
    let authority =
        Arc::new(CredentialAuthority::new(TEST_SECRET, Duration::from_secs(600)).unwrap());

    let users_state = UsersState::new(Arc::new(MemoryStore::new()), authority.clone());
    let orders_state = OrdersState::new(Arc::new(MemoryStore::new()), authority.clone());
    let shutdown = Shutdown::new();

    let users_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let users_addr = users_listener.local_addr().unwrap();
    let users_router = users::router(users_state.clone());
    let users_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = services::serve("users", users_listener, users_router, users_shutdown).await;
    });

    let orders_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let orders_addr = orders_listener.local_addr().unwrap();
    let orders_router = orders::router(orders_state);
    let orders_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = services::serve("orders", orders_listener, orders_router, orders_shutdown).await;
    });

    let mut config = GatewayConfig::default();
    config.backends.users_url = format!("http://{users_addr}");
    config.backends.orders_url = format!("http://{orders_addr}");
    config.auth.secret = TEST_SECRET.to_string();
    tweak(&mut config);

    let gateway_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let gateway = gateway_listener.local_addr().unwrap();
    let server = GatewayServer::new(config).unwrap();
    let gateway_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(gateway_listener, gateway_shutdown).await;
    });

    // Give the listeners a moment to start accepting.
    tokio::time::sleep(Duration::from_millis(100)).await;

    TestStack {
        gateway,
        users_addr,
        orders_addr,
        authority,
        users_state,
        shutdown,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Register a user through the gateway and log in; returns (token, user_id).
#[allow(dead_code)]
pub async fn register_and_login(stack: &TestStack, email: &str) -> (String, String) {
    let client = client();
    let res = client
        .post(stack.url("/v1/users/register"))
        .json(&serde_json::json!({
            "email": email,
            "password": "correct-horse-battery",
            "name": "Test User",
        }))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success(), "registration failed: {}", res.status());

    let res = client
        .post(stack.url("/v1/users/login"))
        .json(&serde_json::json!({
            "email": email,
            "password": "correct-horse-battery",
        }))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    let token = body["data"]["token"].as_str().unwrap().to_string();
    let user_id = body["data"]["user"]["id"].as_str().unwrap().to_string();
    (token, user_id)
}
