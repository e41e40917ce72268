//! Users backend service entrypoint.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use edge_gateway::auth::CredentialAuthority;
use edge_gateway::lifecycle::Shutdown;
use edge_gateway::observability;
use edge_gateway::services::store::MemoryStore;
use edge_gateway::services::users::{self, UsersState};

#[derive(Parser, Debug)]
#[command(name = "users-service", about = "Users backend service")]
struct Args {
    /// Bind address.
    #[arg(short, long, default_value = "127.0.0.1:7101")]
    bind: String,

    /// Shared HMAC secret for credential verification.
    #[arg(long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    auth_secret: String,

    /// Issued token lifetime in seconds.
    #[arg(long, default_value_t = 3_600)]
    token_ttl_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    observability::init_tracing("edge_gateway=debug");

    let args = Args::parse();
    let authority = Arc::new(CredentialAuthority::new(
        &args.auth_secret,
        Duration::from_secs(args.token_ttl_secs),
    )?);
    let state = UsersState::new(Arc::new(MemoryStore::new()), authority);

    let listener = TcpListener::bind(&args.bind).await?;
    let shutdown = Shutdown::new();
    edge_gateway::services::serve("users", listener, users::router(state), shutdown.subscribe())
        .await?;
    Ok(())
}
