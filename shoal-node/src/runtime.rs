//! Process-wide node state: election fields, the index, the discovered-peer
//! list, and tracked-connection accounting. Every connection actor shares one
//! `NodeRuntime`; nothing here is reachable except through synchronized accessors.

use std::sync::Arc;
use std::time::{Duration, Instant};

use shoal_core::{Dht, PeerAddr};
use tokio::sync::{Mutex, Notify};
use tracing::warn;

use crate::config::Config;
use crate::store::FileStore;

/// Leadership fields guarded together. The index only exists while `is_leader`
/// holds; losing leadership drops it.
#[derive(Debug, Default)]
struct ElectionState {
    is_leader: bool,
    leader_addr: Option<PeerAddr>,
    leader_since: Option<Instant>,
    dht: Option<Dht>,
}

/// Shared state for one node process.
pub struct NodeRuntime {
    local_addr: PeerAddr,
    store: FileStore,
    scan_base: u16,
    scan_count: u16,
    max_tracked: usize,
    election: Mutex<ElectionState>,
    peers: Mutex<Vec<PeerAddr>>,
    tracked: Mutex<usize>,
    capacity: Notify,
    test_start: Notify,
}

impl NodeRuntime {
    pub fn new(config: &Config, store: FileStore) -> Arc<Self> {
        Arc::new(Self {
            local_addr: PeerAddr::new(config.host, config.port),
            store,
            scan_base: config.scan_base,
            scan_count: config.scan_count,
            max_tracked: config.max_tracked,
            election: Mutex::new(ElectionState::default()),
            peers: Mutex::new(Vec::new()),
            tracked: Mutex::new(0),
            capacity: Notify::new(),
            test_start: Notify::new(),
        })
    }

    pub fn local_addr(&self) -> PeerAddr {
        self.local_addr
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// Discovery scan range: (first port, number of ports).
    pub fn scan_range(&self) -> (u16, u16) {
        (self.scan_base, self.scan_count)
    }

    pub async fn is_leader(&self) -> bool {
        self.election.lock().await.is_leader
    }

    /// Address callers should treat as "the leader" for index queries.
    pub async fn leader_addr(&self) -> Option<PeerAddr> {
        self.election.lock().await.leader_addr
    }

    /// Take leadership with a fresh index seeded from our own hosted files.
    /// `leader_since` is recorded only when this is an actual transition, so a
    /// leader re-electing itself keeps the start of its current term.
    pub async fn self_elect(&self) {
        let own_files = self.store.list().unwrap_or_else(|err| {
            warn!(%err, "could not list hosted files while taking leadership");
            Vec::new()
        });
        let mut st = self.election.lock().await;
        if !st.is_leader {
            st.leader_since = Some(Instant::now());
        }
        st.is_leader = true;
        st.leader_addr = Some(self.local_addr);
        let mut dht = Dht::new();
        dht.update(self.local_addr, &own_files);
        st.dht = Some(dht);
    }

    /// Re-affirm an existing term without touching the index.
    pub async fn reassert_leadership(&self) {
        let mut st = self.election.lock().await;
        st.is_leader = true;
        st.leader_addr = Some(self.local_addr);
    }

    /// Record another node as leader. Returns how long we had held leadership
    /// if this demotes us, so the caller can log the ended term.
    pub async fn adopt_leader(&self, addr: PeerAddr) -> Option<Duration> {
        let mut st = self.election.lock().await;
        let held = if st.is_leader {
            st.dht = None;
            st.is_leader = false;
            st.leader_since.take().map(|t| t.elapsed())
        } else {
            None
        };
        st.leader_addr = Some(addr);
        held
    }

    /// Merge a peer's file report into the index. False when not leader.
    pub async fn dht_update(&self, from: PeerAddr, file_names: &[String]) -> bool {
        let mut st = self.election.lock().await;
        match st.dht.as_mut() {
            Some(dht) => {
                dht.update(from, file_names);
                true
            }
            None => false,
        }
    }

    /// Remove an address from the index. False when not leader.
    pub async fn dht_delete(&self, addr: PeerAddr) -> bool {
        let mut st = self.election.lock().await;
        match st.dht.as_mut() {
            Some(dht) => {
                dht.delete(addr);
                true
            }
            None => false,
        }
    }

    /// Indexed file names, or None when not leader.
    pub async fn dht_file_list(&self) -> Option<Vec<String>> {
        let st = self.election.lock().await;
        st.dht.as_ref().map(|dht| dht.file_list())
    }

    /// Sources for one file, or None when not leader.
    pub async fn dht_sources(&self, name: &str) -> Option<Vec<PeerAddr>> {
        let st = self.election.lock().await;
        st.dht.as_ref().map(|dht| dht.sources(name))
    }

    /// Replace the discovered-peer list after a scan.
    pub async fn set_peers(&self, peers: Vec<PeerAddr>) {
        *self.peers.lock().await = peers;
    }

    pub async fn peers(&self) -> Vec<PeerAddr> {
        self.peers.lock().await.clone()
    }

    pub async fn knows_peer(&self, addr: PeerAddr) -> bool {
        self.peers.lock().await.contains(&addr)
    }

    /// Count a new tracked inbound actor. Called by the listener after accept.
    pub async fn tracked_incr(&self) -> usize {
        let mut n = self.tracked.lock().await;
        *n += 1;
        *n
    }

    /// Release a tracked actor on disconnect. Wakes the accept loop and
    /// returns the remaining count so the caller can act on it reaching zero.
    pub async fn tracked_decr(&self) -> usize {
        let mut n = self.tracked.lock().await;
        *n = n.saturating_sub(1);
        let remaining = *n;
        drop(n);
        self.capacity.notify_one();
        remaining
    }

    pub async fn tracked_count(&self) -> usize {
        *self.tracked.lock().await
    }

    /// Park until the tracked count is below the ceiling.
    pub async fn wait_for_capacity(&self) {
        loop {
            let notified = self.capacity.notified();
            if *self.tracked.lock().await < self.max_tracked {
                return;
            }
            notified.await;
        }
    }

    /// Raise the test-start signal (TestStart message received).
    pub fn signal_test_start(&self) {
        self.test_start.notify_one();
    }

    /// Block until some peer sends TestStart.
    pub async fn wait_test_start(&self) {
        self.test_start.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn runtime() -> Arc<NodeRuntime> {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("9000")).unwrap();
        let config = Config {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 9000,
            ..Config::default()
        };
        NodeRuntime::new(&config, store)
    }

    fn addr(port: u16) -> PeerAddr {
        PeerAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[tokio::test]
    async fn self_elect_then_adopt_demotes() {
        let rt = runtime();
        rt.self_elect().await;
        assert!(rt.is_leader().await);
        assert_eq!(rt.leader_addr().await, Some(rt.local_addr()));
        assert!(rt.dht_update(addr(9001), &["x".to_string()]).await);

        let held = rt.adopt_leader(addr(9001)).await;
        assert!(held.is_some());
        assert!(!rt.is_leader().await);
        assert_eq!(rt.leader_addr().await, Some(addr(9001)));
        // Index is gone with leadership.
        assert!(rt.dht_file_list().await.is_none());
    }

    #[tokio::test]
    async fn adopt_without_leadership_reports_no_term() {
        let rt = runtime();
        assert!(rt.adopt_leader(addr(9001)).await.is_none());
    }

    #[tokio::test]
    async fn reassert_keeps_index() {
        let rt = runtime();
        rt.self_elect().await;
        assert!(rt.dht_update(addr(9001), &["x".to_string()]).await);
        rt.reassert_leadership().await;
        assert_eq!(rt.dht_file_list().await.unwrap(), vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn tracked_count_round_trips() {
        let rt = runtime();
        assert_eq!(rt.tracked_incr().await, 1);
        assert_eq!(rt.tracked_incr().await, 2);
        assert_eq!(rt.tracked_decr().await, 1);
        assert_eq!(rt.tracked_decr().await, 0);
        // Underflow stays at zero.
        assert_eq!(rt.tracked_decr().await, 0);
    }
}
