//! ringcast wire format — the bytes that cross a replication session.
//!
//! A message frame is positional text followed by a single NUL terminator:
//!
//! ```text
//!   0..4   sender id   (4 bytes, digits in practice)
//!   4      separator   '_'
//!   5..9   receiver id (4 bytes)
//!   9      separator   '_'
//!   10..   <timestamp>_<payload>
//!   last   0x00
//! ```
//!
//! There is no length prefix. The receiver finds the end of a frame by the
//! terminator and splits sender/receiver by fixed offsets. A whole frame,
//! terminator included, never exceeds `MAX_MESSAGE_LEN` bytes.
//!
//! After every frame the receiver answers with the fixed `ACK` token. Its
//! content is never inspected.

use std::ops::Range;

use bytes::{BufMut, Bytes, BytesMut};

use crate::message::{Message, NodeId, NODE_ID_LEN};

/// Maximum frame size in bytes, terminator included.
pub const MAX_MESSAGE_LEN: usize = 277;

/// Shortest decodable message: both ids and both separators.
pub const MIN_MESSAGE_LEN: usize = 10;

pub const SEPARATOR: u8 = b'_';
pub const TERMINATOR: u8 = 0x00;

/// Go-ahead token sent after every received frame.
pub const ACK: [u8; 2] = [0x06, 0x00];
pub const ACK_LEN: usize = ACK.len();

/// Well-known replication port.
pub const DEFAULT_PORT: u16 = 2288;

const SENDER: Range<usize> = 0..4;
const RECEIVER: Range<usize> = 5..9;
const BODY_START: usize = 10;

/// Every decode failure is a malformed message: the frame is dropped and
/// the session carries on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("message too short: {0} bytes, need at least {}", MIN_MESSAGE_LEN)]
    TooShort(usize),
    #[error("message too long: {0} bytes, maximum {}", MAX_MESSAGE_LEN)]
    TooLong(usize),
    #[error("message body contains a NUL byte")]
    EmbeddedTerminator,
}

/// Encode a message into a terminated frame.
pub fn encode(msg: &Message) -> Result<Bytes, WireError> {
    if msg.body().contains(&TERMINATOR) {
        return Err(WireError::EmbeddedTerminator);
    }
    let len = BODY_START + msg.body().len() + 1;
    if len > MAX_MESSAGE_LEN {
        return Err(WireError::TooLong(len));
    }

    let mut buf = BytesMut::with_capacity(len);
    buf.put_slice(msg.sender().as_bytes());
    buf.put_u8(SEPARATOR);
    buf.put_slice(msg.receiver().as_bytes());
    buf.put_u8(SEPARATOR);
    buf.put_slice(msg.body());
    buf.put_u8(TERMINATOR);
    Ok(buf.freeze())
}

/// Decode a frame. A single trailing terminator is accepted and ignored.
///
/// Only the length is checked. Separators, ids and body are taken as raw
/// bytes.
pub fn decode(frame: &[u8]) -> Result<Message, WireError> {
    let frame = strip_terminator(frame);
    if frame.len() + 1 > MAX_MESSAGE_LEN {
        return Err(WireError::TooLong(frame.len() + 1));
    }
    let sender = extract_sender(frame)?;
    let receiver = extract_receiver(frame)?;
    let body = Bytes::copy_from_slice(&frame[BODY_START..]);
    Ok(Message::from_parts(sender, receiver, body))
}

/// Sender id of a frame, without decoding the rest.
pub fn extract_sender(frame: &[u8]) -> Result<NodeId, WireError> {
    id_at(frame, SENDER)
}

/// Receiver id of a frame, without decoding the rest.
pub fn extract_receiver(frame: &[u8]) -> Result<NodeId, WireError> {
    id_at(frame, RECEIVER)
}

fn id_at(frame: &[u8], field: Range<usize>) -> Result<NodeId, WireError> {
    let frame = strip_terminator(frame);
    if frame.len() < MIN_MESSAGE_LEN {
        return Err(WireError::TooShort(frame.len()));
    }
    let mut raw = [0u8; NODE_ID_LEN];
    raw.copy_from_slice(&frame[field]);
    Ok(NodeId::from_wire(raw))
}

fn strip_terminator(frame: &[u8]) -> &[u8] {
    frame.strip_suffix(&[TERMINATOR]).unwrap_or(frame)
}
