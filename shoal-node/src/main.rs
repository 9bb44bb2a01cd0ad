// Shoal node daemon: listener, discovery, leader election, interactive session.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<()> {
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("shoal-node {VERSION}");
            return Ok(());
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = shoal_node::config::load();
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let node = shoal_node::Node::start(cfg.clone()).await?;
        let runtime = node.runtime().clone();
        tokio::select! {
            res = run_session(runtime, cfg.test_mode) => res?,
            _ = shutdown_signal() => {}
        }
        node.shutdown().await;
        Ok::<(), anyhow::Error>(())
    })?;
    Ok(())
}

async fn run_session(
    runtime: std::sync::Arc<shoal_node::NodeRuntime>,
    test_mode: bool,
) -> Result<()> {
    if test_mode {
        shoal_node::session::run_test_pass(runtime).await
    } else {
        shoal_node::session::run_interactive(runtime).await
    }
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
