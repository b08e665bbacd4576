//! Outbound replication sessions.
//!
//! Connects to one peer, takes a consistent slice of the outgoing store
//! starting at that peer's cursor, and pushes it frame by frame, waiting
//! for the ack after each. The cursor only moves over acked entries.

use std::net::SocketAddr;
use std::time::SystemTime;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use ringcast_core::{wire, NodeId};
use ringcast_services::{SessionPhase, SessionRole};

use super::{recv_ack, send_bytes, SessionError};
use crate::node::NodeState;

/// Result of a fully successful outbound session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundReport {
    pub peer: NodeId,
    pub addr: SocketAddr,
    /// Messages acked in this session.
    pub sent: usize,
    /// Peer cursor after the session.
    pub cursor: u64,
}

/// Resolve, connect and push. Connect failures abandon the peer for this
/// round.
pub async fn replicate_to(state: &NodeState, peer: NodeId) -> Result<OutboundReport, SessionError> {
    let addr = state.resolver.resolve(&peer)?;

    let stream = match tokio::time::timeout(state.connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => return Err(SessionError::ConnectFailed { addr, source }),
        Err(_) => {
            return Err(SessionError::ConnectFailed {
                addr,
                source: std::io::ErrorKind::TimedOut.into(),
            })
        }
    };
    tracing::debug!(%peer, %addr, "connected");

    state
        .audit
        .record_session(SessionRole::Outbound, SessionPhase::Start, addr, SystemTime::now());
    let result = push_unsent(stream, state, peer).await;
    state
        .audit
        .record_session(SessionRole::Outbound, SessionPhase::End, addr, SystemTime::now());

    let sent = result?;
    let cursor = state.cursors.get(&peer);
    if sent > 0 {
        tracing::info!(%peer, %addr, sent, cursor, "peer caught up");
    } else {
        tracing::debug!(%peer, %addr, "peer already up to date");
    }
    Ok(OutboundReport {
        peer,
        addr,
        sent,
        cursor,
    })
}

/// Push every outgoing entry the peer has not acked, in lockstep.
///
/// On success the cursor moves to the slice end taken at the start, not
/// to whatever the store length is by then. On failure it moves just past
/// the last acked entry. Returns the number of acked messages.
pub async fn push_unsent<S>(stream: S, state: &NodeState, peer: NodeId) -> Result<usize, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let offset = state.cursors.get(&peer);
    let slice = state.outgoing.slice_from(offset).await;
    tracing::debug!(%peer, offset, start = slice.start, end = slice.end, "pushing slice");

    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut acked = 0;

    for (i, msg) in slice.messages.iter().enumerate() {
        let frame = match wire::encode(msg) {
            Ok(f) => f,
            Err(e) => {
                // Can never be sent; treat as delivered so it does not
                // block the peer forever.
                tracing::warn!(%peer, error = %e, "skipping unencodable message");
                continue;
            }
        };

        let exchange = async {
            send_bytes(&mut writer, &frame, state.io_timeout).await?;
            recv_ack(&mut reader, state.io_timeout).await
        };
        if let Err(e) = exchange.await {
            state.cursors.advance(&peer, slice.start + i as u64);
            tracing::warn!(%peer, acked, remaining = slice.len() - i, error = %e, "push aborted");
            return Err(e);
        }
        acked += 1;
    }

    state.cursors.advance(&peer, slice.end);
    // Everything is acked; a failed close does not undo delivery.
    match tokio::time::timeout(state.io_timeout, writer.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(%peer, error = %e, "close failed"),
        Err(_) => tracing::debug!(%peer, timeout = ?state.io_timeout, "close timed out"),
    }
    Ok(acked)
}
