//! Peer directory — maps a statically configured peer id to the address
//! its replication listener is reachable on.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use ringcast_core::config::RingcastConfig;
use ringcast_core::NodeId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("unknown peer {0}")]
    UnknownPeer(NodeId),
}

/// Resolves a peer id to a transport address.
pub trait PeerResolver: Send + Sync {
    fn resolve(&self, peer: &NodeId) -> Result<SocketAddr, ResolveError>;
}

/// Fixed id → address table.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    addrs: HashMap<NodeId, SocketAddr>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the peer list. Peers without an explicit address use the
    /// `10.0.XX.YY` convention on the node's port.
    pub fn from_config(config: &RingcastConfig) -> Self {
        let mut resolver = Self::new();
        for peer in &config.peers {
            if peer.id == config.node.id {
                continue;
            }
            let addr = match peer.addr {
                Some(addr) => addr,
                None => match conventional_addr(&peer.id, config.node.port) {
                    Some(addr) => addr,
                    None => {
                        tracing::warn!(peer = %peer.id, "peer id has no conventional address, skipping");
                        continue;
                    }
                },
            };
            resolver.insert(peer.id, addr);
        }
        resolver
    }

    pub fn insert(&mut self, peer: NodeId, addr: SocketAddr) {
        self.addrs.insert(peer, addr);
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }
}

impl PeerResolver for StaticResolver {
    fn resolve(&self, peer: &NodeId) -> Result<SocketAddr, ResolveError> {
        self.addrs
            .get(peer)
            .copied()
            .ok_or(ResolveError::UnknownPeer(*peer))
    }
}

/// `ABCD` → `10.0.AB.CD:port`. None for ids that are not digits.
pub fn conventional_addr(peer: &NodeId, port: u16) -> Option<SocketAddr> {
    let id = peer.as_str();
    let hi: u8 = id.get(0..2)?.parse().ok()?;
    let lo: u8 = id.get(2..4)?.parse().ok()?;
    Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, hi, lo)), port))
}
