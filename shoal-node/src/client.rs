//! Leader-facing calls: index queries and direct peer downloads. A query that
//! fails against the recorded leader triggers one full rediscovery + election,
//! then retries once against whatever leader that produced.

use std::sync::Arc;
use std::time::Instant;

use shoal_core::{integrity, PeerAddr};
use tracing::{info, warn};

use crate::connection::{Connection, ConnectionError};
use crate::election;
use crate::runtime::NodeRuntime;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("no leader recorded")]
    NoLeader,
    #[error("recorded leader at {addr} no longer holds the index")]
    StaleLeader { addr: PeerAddr },
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("no sources offered for {file}")]
    NoSources { file: String },
    #[error("peer answered with the wrong file: {got}")]
    WrongFile { got: String },
    #[error("digest mismatch for {file}")]
    IntegrityMismatch { file: String },
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("could not save download: {0}")]
    Save(#[from] std::io::Error),
}

/// The leader's full file list.
pub async fn leader_file_list(runtime: &Arc<NodeRuntime>) -> Result<Vec<String>, ClientError> {
    match try_file_list(runtime).await {
        Ok(list) => Ok(list),
        Err(err) => {
            warn!(%err, "file list query failed, re-electing");
            election::establish(runtime).await;
            try_file_list(runtime).await
        }
    }
}

async fn try_file_list(runtime: &Arc<NodeRuntime>) -> Result<Vec<String>, ClientError> {
    let leader = runtime.leader_addr().await.ok_or(ClientError::NoLeader)?;
    let conn = Connection::dial(leader, runtime.clone()).await?;
    let reply = conn.request_file_list().await;
    conn.disconnect().await;
    reply?.ok_or(ClientError::StaleLeader { addr: leader })
}

/// The peers hosting `file_name`, in the order the leader indexed them.
pub async fn leader_file_sources(
    runtime: &Arc<NodeRuntime>,
    file_name: &str,
) -> Result<Vec<PeerAddr>, ClientError> {
    match try_file_sources(runtime, file_name).await {
        Ok(sources) => Ok(sources),
        Err(err) => {
            warn!(%err, "source query failed, re-electing");
            election::establish(runtime).await;
            try_file_sources(runtime, file_name).await
        }
    }
}

async fn try_file_sources(
    runtime: &Arc<NodeRuntime>,
    file_name: &str,
) -> Result<Vec<PeerAddr>, ClientError> {
    let leader = runtime.leader_addr().await.ok_or(ClientError::NoLeader)?;
    let conn = Connection::dial(leader, runtime.clone()).await?;
    let reply = conn.request_file_sources(file_name).await;
    conn.disconnect().await;
    reply?.ok_or(ClientError::StaleLeader { addr: leader })
}

/// Fetch one file from one hosting peer, verify its digest, store it.
pub async fn download_from(
    runtime: &Arc<NodeRuntime>,
    source: PeerAddr,
    file_name: &str,
) -> Result<(), DownloadError> {
    let started = Instant::now();
    let conn = Connection::dial(source, runtime.clone()).await?;
    let fetched = conn.download(file_name).await;
    conn.disconnect().await;
    let fetched = fetched?;
    if fetched.file_name != file_name {
        return Err(DownloadError::WrongFile {
            got: fetched.file_name,
        });
    }
    if !integrity::verify(&fetched.bytes, &fetched.digest) {
        return Err(DownloadError::IntegrityMismatch {
            file: file_name.to_string(),
        });
    }
    runtime.store().save(file_name, &fetched.bytes)?;
    info!(
        file = %file_name,
        peer = %source,
        bytes = fetched.bytes.len(),
        elapsed = ?started.elapsed(),
        "download"
    );
    Ok(())
}

/// Try each source in order until one download verifies. Returns the peer
/// that served the file.
pub async fn fetch_file(
    runtime: &Arc<NodeRuntime>,
    file_name: &str,
    sources: &[PeerAddr],
) -> Result<PeerAddr, DownloadError> {
    let mut last = DownloadError::NoSources {
        file: file_name.to_string(),
    };
    for &source in sources {
        match download_from(runtime, source, file_name).await {
            Ok(()) => return Ok(source),
            Err(err) => {
                warn!(file = %file_name, peer = %source, %err, "source failed");
                last = err;
            }
        }
    }
    Err(last)
}

/// Ask the leader to forget every file we host. When we are the leader, the
/// removal is applied directly.
pub async fn deactivate_self(runtime: &Arc<NodeRuntime>) -> Result<(), ClientError> {
    let local = runtime.local_addr();
    let leader = runtime.leader_addr().await.ok_or(ClientError::NoLeader)?;
    if leader == local {
        runtime.dht_delete(local).await;
        return Ok(());
    }
    let conn = Connection::dial(leader, runtime.clone()).await?;
    let sent = conn.deactivate(local);
    conn.disconnect().await;
    sent?;
    Ok(())
}
