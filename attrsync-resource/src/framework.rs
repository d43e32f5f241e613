use std::net::SocketAddr;

use anyhow::{Context, Result};
use attrsync_core::accessor::RemoteObjectAccessor;
use jsonrpsee::server::{Server, ServerHandle};
use tracing::info;

use crate::rpc::AttributesRpcServer;

/// Starts serving `accessor` over JSON-RPC (HTTP and WebSocket) on `addr`.
///
/// Returns the bound address, which differs from `addr` when port 0 was
/// requested, and a handle to stop the server.
pub async fn run_server<A>(accessor: A, addr: SocketAddr) -> Result<(SocketAddr, ServerHandle)>
where
    A: RemoteObjectAccessor + 'static,
{
    let server = Server::builder()
        .build(addr)
        .await
        .with_context(|| format!("Could not bind JSON-RPC server to {}", addr))?;
    let local_addr = server
        .local_addr()
        .with_context(|| "Could not determine JSON-RPC server address")?;
    let handle = server.start(accessor.into_rpc());
    info!(%local_addr, "serving attributes");
    Ok((local_addr, handle))
}
