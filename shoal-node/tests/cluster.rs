//! Multi-node scenarios over localhost TCP: election convergence, index
//! registration, downloads, and concurrent index updates.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use shoal_core::PeerAddr;
use shoal_node::connection::Connection;
use shoal_node::store::FileStore;
use shoal_node::{client, Config, Node, NodeRuntime};
use tempfile::TempDir;

/// Each test claims a disjoint slice of ports so parallel tests never scan
/// into each other's nodes.
static PORT_BASE: AtomicU16 = AtomicU16::new(42000);
const SLICE: u16 = 16;

fn claim_ports() -> u16 {
    PORT_BASE.fetch_add(SLICE, Ordering::SeqCst)
}

fn localhost() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn config(base: u16, offset: u16, scan_count: u16, dir: &TempDir) -> Config {
    Config {
        host: localhost(),
        port: base + offset,
        files_dir: dir.path().to_path_buf(),
        scan_base: base,
        scan_count,
        max_tracked: 16,
        test_mode: false,
    }
}

/// Drop a file into the store a node at `port` will serve from.
fn host_file(dir: &TempDir, port: u16, name: &str, content: &[u8]) {
    let root = dir.path().join(port.to_string());
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join(name), content).unwrap();
}

#[tokio::test]
async fn self_election_with_no_peers() {
    let base = claim_ports();
    let dir = tempfile::tempdir().unwrap();

    // Scan range covers only our own port, which discovery skips.
    let node = Node::start(config(base, 0, 1, &dir)).await.unwrap();

    let runtime = node.runtime();
    assert!(runtime.is_leader().await);
    assert_eq!(runtime.leader_addr().await, Some(runtime.local_addr()));
    assert_eq!(runtime.dht_file_list().await.unwrap(), Vec::<String>::new());
    node.shutdown().await;
}

#[tokio::test]
async fn joining_node_adopts_existing_leader() {
    let base = claim_ports();
    let dir = tempfile::tempdir().unwrap();

    let a = Node::start(config(base, 0, 4, &dir)).await.unwrap();
    let b = Node::start(config(base, 1, 4, &dir)).await.unwrap();
    let c = Node::start(config(base, 2, 4, &dir)).await.unwrap();
    let d = Node::start(config(base, 3, 4, &dir)).await.unwrap();

    let a_addr = a.runtime().local_addr();
    assert!(a.runtime().is_leader().await);
    for joiner in [&b, &c, &d] {
        assert!(!joiner.runtime().is_leader().await);
        assert_eq!(joiner.runtime().leader_addr().await, Some(a_addr));
    }

    d.shutdown().await;
    c.shutdown().await;
    b.shutdown().await;
    a.shutdown().await;
}

#[tokio::test]
async fn end_to_end_register_query_download() {
    let base = claim_ports();
    let dir = tempfile::tempdir().unwrap();

    host_file(&dir, base, "f1.txt", b"shared by the first node");
    host_file(&dir, base + 1, "f2.txt", b"shared by the second node");

    let a = Node::start(config(base, 0, 3, &dir)).await.unwrap();
    let b = Node::start(config(base, 1, 3, &dir)).await.unwrap();
    let c = Node::start(config(base, 2, 3, &dir)).await.unwrap();

    let a_addr = a.runtime().local_addr();

    // The leader indexes its own files and every joiner's report.
    let list = client::leader_file_list(c.runtime()).await.unwrap();
    assert!(list.contains(&"f1.txt".to_string()), "list was {list:?}");
    assert!(list.contains(&"f2.txt".to_string()), "list was {list:?}");

    let sources = client::leader_file_sources(c.runtime(), "f1.txt")
        .await
        .unwrap();
    assert_eq!(sources, vec![a_addr]);

    // Digest verification happens inside the download path; a mismatch would
    // surface as an error here.
    let served_by = client::fetch_file(c.runtime(), "f1.txt", &sources)
        .await
        .unwrap();
    assert_eq!(served_by, a_addr);
    assert_eq!(
        c.runtime().store().read("f1.txt").unwrap(),
        b"shared by the first node"
    );

    c.shutdown().await;
    b.shutdown().await;
    a.shutdown().await;
}

#[tokio::test]
async fn concurrent_updates_are_all_indexed() {
    let base = claim_ports();
    let dir = tempfile::tempdir().unwrap();

    let leader = Node::start(config(base, 0, 1, &dir)).await.unwrap();
    let leader_addr = leader.runtime().local_addr();

    // A bare runtime to drive client connections; it never binds a listener.
    let client_dir = tempfile::tempdir().unwrap();
    let client_rt: Arc<NodeRuntime> = NodeRuntime::new(
        &config(base, 1, 1, &client_dir),
        FileStore::open(client_dir.path().join("client")).unwrap(),
    );

    // Keep one connection open for the whole test so the leader's tracked
    // count never hits zero mid-flight (which would re-run its election).
    let holder = Connection::dial(leader_addr, client_rt.clone())
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..8u16 {
        let client_rt = client_rt.clone();
        tasks.push(tokio::spawn(async move {
            let conn = Connection::dial(leader_addr, client_rt).await.unwrap();
            let from = PeerAddr::new(localhost(), 7000 + i);
            let accepted = conn
                .update_dht(from, vec![format!("file-{i}.txt")])
                .await
                .unwrap();
            conn.disconnect().await;
            accepted
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap(), "an update was refused");
    }

    let list = holder.request_file_list().await.unwrap().unwrap();
    for i in 0..8 {
        assert!(
            list.contains(&format!("file-{i}.txt")),
            "lost update for file-{i}.txt in {list:?}"
        );
    }

    holder.disconnect().await;
    leader.shutdown().await;
}

#[tokio::test]
async fn failed_leader_query_triggers_reelection() {
    let base = claim_ports();
    let dir = tempfile::tempdir().unwrap();

    let a = Node::start(config(base, 0, 3, &dir)).await.unwrap();
    let b = Node::start(config(base, 1, 3, &dir)).await.unwrap();
    let c = Node::start(config(base, 2, 3, &dir)).await.unwrap();
    let a_addr = a.runtime().local_addr();
    assert_eq!(c.runtime().leader_addr().await, Some(a_addr));

    // Take the leader away; the next query must rediscover and settle on a
    // surviving node instead of erroring out.
    a.shutdown().await;

    let list = client::leader_file_list(c.runtime()).await;
    assert!(list.is_ok(), "query after leader loss failed: {list:?}");
    let new_leader = c.runtime().leader_addr().await.unwrap();
    assert_ne!(new_leader, a_addr);

    c.shutdown().await;
    b.shutdown().await;
}
