//! Gateway process entrypoint.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use edge_gateway::config::{load_config, GatewayConfig};
use edge_gateway::lifecycle::Shutdown;
use edge_gateway::observability;
use edge_gateway::GatewayServer;

#[derive(Parser, Debug)]
#[command(name = "edge-gateway", about = "API gateway fronting the users and orders services")]
struct Args {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    observability::init_tracing("edge_gateway=debug,tower_http=info");

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    tracing::info!(
        bind_address = %config.listener.bind_address,
        users_url = %config.backends.users_url,
        orders_url = %config.backends.orders_url,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => observability::metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let shutdown = Shutdown::new();
    let server = GatewayServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
