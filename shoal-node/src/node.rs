//! Node assembly: file store + runtime + listener + initial election.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::runtime::NodeRuntime;
use crate::store::FileStore;
use crate::{election, listener};

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("failed to open file store: {0}")]
    Store(std::io::Error),
    #[error("failed to bind listener: {0}")]
    Bind(std::io::Error),
}

/// A running node: accepting inbound connections with a settled initial leader.
pub struct Node {
    runtime: Arc<NodeRuntime>,
    accept_task: JoinHandle<()>,
}

impl Node {
    /// Bind the listener, start accepting, then run election passes until a
    /// leader is settled. Bind failure is the one startup error that must
    /// terminate the process; everything after it is recoverable.
    pub async fn start(config: Config) -> Result<Self, NodeError> {
        let store = FileStore::open(config.files_dir.join(config.port.to_string()))
            .map_err(NodeError::Store)?;
        let runtime = NodeRuntime::new(&config, store);
        let listener = listener::bind(&runtime).await.map_err(NodeError::Bind)?;
        let accept_task = tokio::spawn(listener::run(listener, runtime.clone()));
        let leader = election::establish(&runtime).await;
        info!(leader = %leader, "initial election settled");
        Ok(Self {
            runtime,
            accept_task,
        })
    }

    pub fn runtime(&self) -> &Arc<NodeRuntime> {
        &self.runtime
    }

    /// Stop accepting new connections and release the listening port.
    /// Existing actors end with their peers.
    pub async fn shutdown(self) {
        self.accept_task.abort();
        let _ = self.accept_task.await;
        info!("listener stopped");
    }
}
