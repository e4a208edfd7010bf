//! JSON-RPC server for taskbeacon-daemon.

use anyhow::{Context, Result};
use jsonrpsee::server::{Server, ServerHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use super::handlers::{ApiImpl, TaskbeaconApiServer};
use crate::flow::FlowManager;

/// Start the JSON-RPC API server.
///
/// Returns the handle that keeps the server running and the address it is
/// listening on (useful when binding port 0).
pub async fn start_server(
    bind_address: &str,
    flows: Arc<FlowManager>,
) -> Result<(ServerHandle, SocketAddr)> {
    info!("Starting JSON-RPC server on {}", bind_address);

    let server = Server::builder()
        .build(bind_address)
        .await
        .with_context(|| format!("Failed to build JSON-RPC server on {}", bind_address))?;

    let addr = server
        .local_addr()
        .context("Failed to get server address")?;
    info!("JSON-RPC server listening on {}", addr);

    let handle = server.start(ApiImpl::new(flows).into_rpc());
    Ok((handle, addr))
}
