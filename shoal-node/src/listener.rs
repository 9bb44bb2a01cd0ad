//! Listener: accept inbound connections, bounded by the tracked-connection
//! ceiling. The accept loop parks while at capacity rather than admitting
//! bursts above it.

use std::io;
use std::sync::Arc;

use shoal_core::PeerAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::connection::Connection;
use crate::runtime::NodeRuntime;

/// Bind the node's own address. A bind failure is fatal for the process.
pub async fn bind(runtime: &NodeRuntime) -> io::Result<TcpListener> {
    let addr = runtime.local_addr().socket_addr();
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    Ok(listener)
}

/// Accept loop. Each accepted connection becomes a tracked actor; the tracked
/// count goes up here and comes back down in the actor's Disconnect handling.
pub async fn run(listener: TcpListener, runtime: Arc<NodeRuntime>) {
    loop {
        runtime.wait_for_capacity().await;
        match listener.accept().await {
            Ok((stream, addr)) => {
                let active = runtime.tracked_incr().await;
                info!(active, "tracked connections");
                Connection::adopt(stream, PeerAddr::from(addr), true, runtime.clone());
            }
            Err(err) => {
                warn!(%err, "accept failed");
            }
        }
    }
}
