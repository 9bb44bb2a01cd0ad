//! Peer discovery: liveness-probe a contiguous port range on the local host.
//! Coarse and periodic; worst-case latency is range size times the dial timeout.

use std::time::Duration;

use shoal_core::{wire, Message, PeerAddr};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::runtime::NodeRuntime;

/// Per-candidate dial timeout. Dead ports on the local host refuse almost
/// immediately; this bounds the stragglers.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Rescan the configured range and replace the runtime's peer list.
/// The node's own port is skipped.
pub async fn refresh(runtime: &NodeRuntime) -> Vec<PeerAddr> {
    let local = runtime.local_addr();
    let (base, count) = runtime.scan_range();
    let mut found = Vec::new();
    for port in base..base.saturating_add(count) {
        if port == local.port {
            continue;
        }
        let candidate = PeerAddr::new(local.host, port);
        if probe(candidate).await {
            found.push(candidate);
        }
    }
    info!(peers = found.len(), "peer scan complete");
    runtime.set_peers(found.clone()).await;
    found
}

/// Dial once purely to test liveness, wave goodbye, drop the socket.
async fn probe(addr: PeerAddr) -> bool {
    match tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(addr.socket_addr())).await {
        Ok(Ok(mut stream)) => {
            if let Ok(frame) = wire::encode_frame(&Message::Disconnect) {
                let _ = stream.write_all(&frame).await;
            }
            debug!(peer = %addr, "probe hit");
            true
        }
        _ => false,
    }
}
