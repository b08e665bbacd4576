//! ringcast integration test harness.
//!
//! Every test runs complete nodes in-process, each with its own listener
//! on an ephemeral 127.0.0.1 port. Message generation is disabled; tests
//! inject messages through the node handle.
//!
//!   cargo test --test integration

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::net::TcpListener;

use ringcast_core::config::{PeerConfig, RingcastConfig};
use ringcast_core::NodeId;
use ringcast_services::{MemoryAuditLog, StaticResolver};
use ringcastd::{Node, NodeHandle};

mod failures;
mod flooding;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const CAPACITY: usize = 64;

pub fn id(s: &str) -> NodeId {
    s.parse().unwrap()
}

/// A node bound to its port but not yet running.
pub struct PendingNode {
    pub id: NodeId,
    pub addr: SocketAddr,
    listener: TcpListener,
}

pub async fn bind(node_id: &str) -> Result<PendingNode> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    Ok(PendingNode {
        id: id(node_id),
        addr: listener.local_addr()?,
        listener,
    })
}

/// A running node plus the audit records it produced.
pub struct TestNode {
    pub handle: NodeHandle,
    pub audit: Arc<MemoryAuditLog>,
}

impl TestNode {
    pub fn id(&self) -> NodeId {
        self.handle.state().id
    }
}

pub fn test_config(node: NodeId, peers: &[(NodeId, SocketAddr)]) -> RingcastConfig {
    let mut config = RingcastConfig::default();
    config.node.id = node;
    config.node.listen_addr = [127, 0, 0, 1].into();
    config.peers = peers
        .iter()
        .map(|(id, addr)| PeerConfig {
            id: *id,
            addr: Some(*addr),
        })
        .collect();
    config.store.capacity = CAPACITY;
    config.generator.enabled = false;
    config.session.connect_timeout_ms = 1_000;
    config.session.io_timeout_ms = 500;
    config
}

/// Start `node` knowing `peers`.
pub fn start(node: PendingNode, peers: &[(NodeId, SocketAddr)]) -> TestNode {
    let config = test_config(node.id, peers);
    let audit = Arc::new(MemoryAuditLog::new());
    let resolver = Arc::new(StaticResolver::from_config(&config));
    let handle = Node::with_listener(&config, node.listener, resolver, audit.clone()).spawn();
    TestNode { handle, audit }
}

/// Bind every node first so addresses are known, then start them all.
/// `topology` lists each node with the ids of the peers it knows.
pub async fn start_cluster(topology: &[(&str, &[&str])]) -> Result<Vec<TestNode>> {
    let mut pending = Vec::new();
    for (node, _) in topology {
        pending.push(bind(node).await?);
    }
    let addrs: Vec<(NodeId, SocketAddr)> = pending.iter().map(|p| (p.id, p.addr)).collect();

    let mut nodes = Vec::new();
    for (node, (_, peers)) in pending.into_iter().zip(topology) {
        let known: Vec<(NodeId, SocketAddr)> = addrs
            .iter()
            .filter(|(peer, _)| peers.iter().any(|p| id(p) == *peer))
            .copied()
            .collect();
        nodes.push(start(node, &known));
    }
    Ok(nodes)
}

pub async fn shutdown_all(nodes: Vec<TestNode>) {
    for node in nodes {
        node.handle.shutdown().await;
    }
}

/// Poll `check` until it holds or five seconds pass.
pub async fn eventually<F, Fut>(what: &str, mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    bail!("timed out waiting for {what}")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

/// Cluster nodes come up listening and with every cursor at zero.
#[tokio::test]
async fn test_cluster_starts_clean() -> Result<()> {
    let nodes = start_cluster(&[("1000", &["2000"]), ("2000", &["1000"])]).await?;

    for node in &nodes {
        let state = node.handle.state();
        assert!(node.handle.local_addr().is_some());
        assert_eq!(state.peers.len(), 1);
        assert_eq!(state.cursors.get(&state.peers[0]), 0);
        assert!(state.outgoing.is_empty().await);
        assert!(state.inbox.is_empty().await);
    }

    shutdown_all(nodes).await;
    Ok(())
}
