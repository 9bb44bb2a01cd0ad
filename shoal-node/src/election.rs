//! Leader election: a linear scan over the discovered peers, first responder
//! wins, no tie-break. Concurrent elections can transiently crown more than
//! one leader; later rescans reconcile them. Liveness first, not safety first.

use std::sync::Arc;
use std::time::Duration;

use shoal_core::PeerAddr;
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionError};
use crate::discovery;
use crate::runtime::NodeRuntime;

/// Attempts to land one accepted UpdateDht before a pass is declared failed.
const PUSH_ATTEMPTS: usize = 5;
/// Pause between push attempts and between failed passes.
const RETRY_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, thiserror::Error)]
pub enum ElectionError {
    #[error("leader at {leader} never accepted our file report")]
    PushRejected { leader: PeerAddr },
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Run election passes until one settles, returning the leader's address.
/// Every pass starts with a fresh scan, so a pass that failed against a stale
/// leader converges once the network quiets down.
pub async fn establish(runtime: &Arc<NodeRuntime>) -> PeerAddr {
    loop {
        match run_pass(runtime).await {
            Ok(leader) => return leader,
            Err(err) => {
                warn!(%err, "election pass failed, rescanning");
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }
}

/// One discovery + scan pass.
pub async fn run_pass(runtime: &Arc<NodeRuntime>) -> Result<PeerAddr, ElectionError> {
    let peers = discovery::refresh(runtime).await;
    let local = runtime.local_addr();

    // Alone in the range: the index is ours.
    if peers.is_empty() {
        runtime.self_elect().await;
        info!("self-elected leader, no peers reachable");
        return Ok(local);
    }

    // Scan in list order; the first peer claiming leadership wins.
    for peer in &peers {
        let conn = match Connection::dial(*peer, runtime.clone()).await {
            Ok(conn) => conn,
            Err(err) => {
                debug!(peer = %peer, %err, "peer gone before leader check");
                continue;
            }
        };
        let claims = match conn.leader_check(local).await {
            Ok(claims) => claims,
            Err(err) => {
                debug!(peer = %peer, %err, "leader check failed");
                conn.disconnect().await;
                continue;
            }
        };
        if claims {
            if let Some(held) = runtime.adopt_leader(*peer).await {
                info!(leader = %peer, held = ?held, "stepped down for existing leader");
            } else {
                info!(leader = %peer, "adopting existing leader");
            }
            let push = push_file_list(&conn, runtime).await;
            conn.disconnect().await;
            push?;
            return Ok(*peer);
        }
        conn.disconnect().await;
    }

    // Nobody claims the index. Take it, or keep it if it was already ours.
    if runtime.is_leader().await {
        runtime.reassert_leadership().await;
        info!("still leader after rescan");
    } else {
        runtime.self_elect().await;
        info!(peers = peers.len(), "elected leader, notifying peers");
        for peer in &peers {
            match Connection::dial(*peer, runtime.clone()).await {
                Ok(conn) => {
                    let _ = conn.notify_leader(local);
                    conn.disconnect().await;
                }
                Err(err) => debug!(peer = %peer, %err, "peer missed the leader notice"),
            }
        }
    }
    Ok(local)
}

/// Report our hosted files over an open connection to the leader, retrying
/// until the ack says accepted.
pub async fn push_file_list(
    conn: &Connection,
    runtime: &NodeRuntime,
) -> Result<(), ElectionError> {
    let files = runtime.store().list().unwrap_or_else(|err| {
        warn!(%err, "could not list hosted files for the report");
        Vec::new()
    });
    for _ in 0..PUSH_ATTEMPTS {
        match conn.update_dht(runtime.local_addr(), files.clone()).await {
            Ok(true) => {
                info!(files = files.len(), "file report accepted by leader");
                return Ok(());
            }
            Ok(false) => tokio::time::sleep(RETRY_DELAY).await,
            Err(err) => return Err(err.into()),
        }
    }
    Err(ElectionError::PushRejected {
        leader: conn.peer_addr(),
    })
}

/// Dial the recorded leader and push our file list, electing anew whenever the
/// recorded leader cannot be reached. Returns once some leader has our report
/// or we became the leader ourselves.
pub async fn register_with_leader(runtime: &Arc<NodeRuntime>) {
    loop {
        let leader = match runtime.leader_addr().await {
            Some(addr) if addr != runtime.local_addr() => addr,
            // We hold the index (or no leader is recorded); nothing to push.
            _ => return,
        };
        let attempt: Result<(), ElectionError> = async {
            let conn = Connection::dial(leader, runtime.clone()).await?;
            let pushed = push_file_list(&conn, runtime).await;
            conn.disconnect().await;
            pushed
        }
        .await;
        match attempt {
            Ok(()) => return,
            Err(err) => {
                warn!(leader = %leader, %err, "cannot register with leader, re-electing");
                establish(runtime).await;
            }
        }
    }
}
