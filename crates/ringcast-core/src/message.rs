//! The message record flooded between nodes.
//!
//! A message is immutable once created. Two messages are the same message
//! exactly when their wire forms are byte-identical, which is what the
//! stores deduplicate on. Wire bytes are kept as they arrived; nothing
//! here requires them to be valid text.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Width of a node identifier, in bytes.
pub const NODE_ID_LEN: usize = 4;

/// Fixed-width node identifier. Configured ids are four ASCII digits; ids
/// read off the wire are whatever four bytes the sender wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId([u8; NODE_ID_LEN]);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeIdError {
    #[error("node id must be exactly {} characters, got {0}", NODE_ID_LEN)]
    BadLength(usize),
    #[error("node id must be ASCII digits: {0:?}")]
    NotDigits(String),
}

impl NodeId {
    /// Take an id verbatim from wire bytes.
    pub fn from_wire(bytes: [u8; NODE_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; NODE_ID_LEN] {
        &self.0
    }

    /// Text form; bytes that are not UTF-8 render as U+FFFD.
    pub fn as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

/// The unassigned id, `0000`.
impl Default for NodeId {
    fn default() -> Self {
        Self(*b"0000")
    }
}

impl FromStr for NodeId {
    type Err = NodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; NODE_ID_LEN] = s
            .as_bytes()
            .try_into()
            .map_err(|_| NodeIdError::BadLength(s.len()))?;
        if !bytes.iter().all(u8::is_ascii_digit) {
            return Err(NodeIdError::NotDigits(s.to_string()));
        }
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for NodeId {
    type Error = NodeIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.as_str().into_owned()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

/// A single flooded message.
///
/// `body` is everything after the receiver field on the wire:
/// `<timestamp>_<payload>`. It is kept as raw bytes so that equality stays
/// exact even for bodies another node formatted differently.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Message {
    sender: NodeId,
    receiver: NodeId,
    body: Bytes,
}

impl Message {
    /// Compose a fresh message from its logical fields.
    pub fn new(sender: NodeId, receiver: NodeId, timestamp: u64, payload: &str) -> Self {
        Self {
            sender,
            receiver,
            body: Bytes::from(format!("{timestamp}_{payload}")),
        }
    }

    /// Rebuild a message from a decoded body.
    pub fn from_parts(sender: NodeId, receiver: NodeId, body: impl Into<Bytes>) -> Self {
        Self {
            sender,
            receiver,
            body: body.into(),
        }
    }

    pub fn sender(&self) -> NodeId {
        self.sender
    }

    pub fn receiver(&self) -> NodeId {
        self.receiver
    }

    /// Raw `<timestamp>_<payload>` remainder.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Timestamp bytes (everything before the first `_` of the body).
    pub fn timestamp(&self) -> &[u8] {
        self.split_body().0
    }

    /// Timestamp as unix seconds, if the sender wrote a number.
    pub fn timestamp_secs(&self) -> Option<u64> {
        std::str::from_utf8(self.timestamp()).ok()?.parse().ok()
    }

    /// Payload bytes (everything after the first `_` of the body).
    pub fn payload(&self) -> &[u8] {
        self.split_body().1
    }

    fn split_body(&self) -> (&[u8], &[u8]) {
        match self.body.iter().position(|&b| b == b'_') {
            Some(i) => (&self.body[..i], &self.body[i + 1..]),
            None => (&self.body[..], &[][..]),
        }
    }

    /// Is this message addressed to `node`?
    pub fn is_for(&self, node: &NodeId) -> bool {
        self.receiver == *node
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            self.sender,
            self.receiver,
            String::from_utf8_lossy(&self.body)
        )
    }
}
