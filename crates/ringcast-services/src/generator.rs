//! Local message generator.
//!
//! Produces self-originated messages addressed to a random known peer. The
//! timing of generation is up to the caller.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::seq::SliceRandom;
use rand::Rng;

use ringcast_core::{Message, NodeId};

pub struct MessageGenerator {
    local: NodeId,
    candidates: Vec<NodeId>,
    payload: String,
}

impl MessageGenerator {
    /// `peers` may contain the local id; it is never picked as receiver.
    pub fn new(local: NodeId, peers: impl IntoIterator<Item = NodeId>, payload: impl Into<String>) -> Self {
        let mut candidates: Vec<NodeId> = peers.into_iter().filter(|p| *p != local).collect();
        candidates.sort();
        candidates.dedup();
        Self {
            local,
            candidates,
            payload: payload.into(),
        }
    }

    pub fn local_id(&self) -> NodeId {
        self.local
    }

    /// New message stamped with the current time. None if there is nobody
    /// to address it to.
    pub fn generate(&self) -> Option<Message> {
        self.generate_with(&mut rand::thread_rng(), unix_now())
    }

    pub fn generate_with<R: Rng + ?Sized>(&self, rng: &mut R, timestamp: u64) -> Option<Message> {
        let receiver = *self.candidates.choose(rng)?;
        Some(Message::new(self.local, receiver, timestamp, &self.payload))
    }
}

/// Seconds since the unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
