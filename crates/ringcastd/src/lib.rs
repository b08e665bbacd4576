//! ringcastd — store-and-forward flooding node.
//!
//! A node keeps two bounded ring stores: an inbox for messages addressed
//! to it and an outgoing ring of messages eligible for forwarding. Flood
//! rounds push each peer the outgoing entries it has not yet acked.

pub mod flood;
pub mod node;
pub mod scheduler;
pub mod session;

pub use node::{Node, NodeHandle, NodeState, SharedState};
