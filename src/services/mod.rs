//! Backend service stubs: users and orders.
//!
//! Each service owns its entity store behind the injected [`store::EntityStore`]
//! interface and serves the same envelope contract the gateway relays.

pub mod orders;
pub mod store;
pub mod users;

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Serve one backend service until shutdown.
pub async fn serve(
    name: &'static str,
    listener: TcpListener,
    router: Router,
    shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(service = name, address = %addr, "Service listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(crate::lifecycle::shutdown::wait(shutdown))
    .await?;

    tracing::info!(service = name, "Service stopped");
    Ok(())
}
