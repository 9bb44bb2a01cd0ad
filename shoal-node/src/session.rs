//! Session loops: the menu-driven interactive flow and the scripted test pass.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use rand::Rng;
use shoal_core::PeerAddr;
use tracing::{info, warn};

use crate::runtime::NodeRuntime;
use crate::{client, election, menu};

/// Rounds of batch retries for files that failed to download.
const RETRY_ROUNDS: usize = 3;

/// Menu-driven loop: sync, download, exit. Returns when the user exits or
/// stdin closes.
pub async fn run_interactive(runtime: Arc<NodeRuntime>) -> Result<()> {
    loop {
        println!("\nNode active:");
        println!("  0  exit");
        println!("  1  re-sync with the leader");
        println!("  2  download from the network");
        let choice = tokio::task::spawn_blocking(|| menu::select_index(3)).await??;
        match choice {
            0 => return Ok(()),
            1 => election::register_with_leader(&runtime).await,
            2 => download_flow(&runtime).await?,
            _ => {}
        }
    }
}

/// Query the index, let the user pick files, download them with bounded
/// batch retries, report what could not be fetched.
async fn download_flow(runtime: &Arc<NodeRuntime>) -> Result<()> {
    let file_list = client::leader_file_list(runtime).await?;
    if file_list.is_empty() {
        println!("Not enough files in the network to download.");
        return Ok(());
    }
    menu::print_indexed(
        "Select files to download by index. Separate several with commas:",
        &file_list,
    );
    let len = file_list.len();
    let picked = tokio::task::spawn_blocking(move || menu::select_indices(len)).await??;
    let mut wanted: Vec<String> = picked.iter().map(|&i| file_list[i].clone()).collect();
    println!("\nDownloading {wanted:?}\n");

    let started = Instant::now();
    let mut rounds_left = RETRY_ROUNDS;
    loop {
        let mut failed = Vec::new();
        for name in &wanted {
            match download_one(runtime, name).await {
                Ok(source) => {
                    println!("{name} downloaded from {source}, integrity check passed");
                }
                Err(err) => {
                    warn!(file = %name, %err, "download failed");
                    failed.push(name.clone());
                }
            }
        }
        wanted = failed;
        if wanted.is_empty() || rounds_left == 0 {
            break;
        }
        println!("{wanted:?} failed to download, {rounds_left} tries left");
        rounds_left -= 1;
    }
    for name in &wanted {
        println!("{name} could not be downloaded");
    }
    println!("Total download time: {:.2?}", started.elapsed());
    Ok(())
}

/// Sources are re-queried every attempt so a retry sees the current index.
async fn download_one(runtime: &Arc<NodeRuntime>, name: &str) -> Result<PeerAddr> {
    let sources = client::leader_file_sources(runtime, name).await?;
    let source = client::fetch_file(runtime, name, &sources).await?;
    Ok(source)
}

/// Scripted pass for multi-node test runs: wait for TestStart, then fetch the
/// first indexed file from a random source, deactivating ourselves from the
/// index and retrying while the download fails.
pub async fn run_test_pass(runtime: Arc<NodeRuntime>) -> Result<()> {
    runtime.wait_test_start().await;
    info!("test pass triggered");
    loop {
        election::establish(&runtime).await;
        let file_list = client::leader_file_list(&runtime).await?;
        let Some(name) = file_list.first().cloned() else {
            anyhow::bail!("no files indexed for the test pass");
        };
        let sources = client::leader_file_sources(&runtime, &name).await?;
        if sources.is_empty() {
            anyhow::bail!("no sources indexed for {name}");
        }
        let source = sources[rand::thread_rng().gen_range(0..sources.len())];
        println!("Downloading {name} from {source}");
        match client::download_from(&runtime, source, &name).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                warn!(%err, "test download failed, deactivating and retrying");
                let _ = client::deactivate_self(&runtime).await;
            }
        }
    }
}
