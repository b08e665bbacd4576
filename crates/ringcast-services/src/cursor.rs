//! Per-peer send cursors into the outgoing store.
//!
//! A cursor of `n` means the peer has acknowledged every outgoing entry with
//! logical index below `n`. Cursors only move forward, except when the
//! outgoing store wraps and resets them all to zero.

use std::sync::Arc;

use dashmap::DashMap;
use ringcast_core::NodeId;

/// Cursor table shared by the outgoing store and all outbound sessions.
#[derive(Clone, Default)]
pub struct PeerCursorTable {
    cursors: Arc<DashMap<NodeId, u64>>,
}

impl PeerCursorTable {
    /// Every known peer starts at zero.
    pub fn new(peers: impl IntoIterator<Item = NodeId>) -> Self {
        let cursors = DashMap::new();
        for peer in peers {
            cursors.insert(peer, 0);
        }
        Self {
            cursors: Arc::new(cursors),
        }
    }

    /// Current cursor. Unknown peers read as zero.
    pub fn get(&self, peer: &NodeId) -> u64 {
        self.cursors.get(peer).map(|c| *c).unwrap_or(0)
    }

    /// Move a peer's cursor forward to `offset`.
    ///
    /// Returns false and leaves the table untouched when `offset` would not
    /// move the cursor forward, or when the peer is unknown.
    pub fn advance(&self, peer: &NodeId, offset: u64) -> bool {
        match self.cursors.get_mut(peer) {
            Some(mut cursor) if offset > *cursor => {
                *cursor = offset;
                true
            }
            Some(cursor) => {
                if offset < *cursor {
                    tracing::debug!(%peer, current = *cursor, offset, "ignoring cursor regression");
                }
                false
            }
            None => false,
        }
    }

    /// Rewind every peer to zero.
    pub fn reset_all(&self) {
        for mut cursor in self.cursors.iter_mut() {
            *cursor = 0;
        }
    }

    pub fn contains(&self, peer: &NodeId) -> bool {
        self.cursors.contains_key(peer)
    }

    /// Known peers, sorted.
    pub fn peers(&self) -> Vec<NodeId> {
        let mut peers: Vec<NodeId> = self.cursors.iter().map(|e| *e.key()).collect();
        peers.sort();
        peers
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }
}
