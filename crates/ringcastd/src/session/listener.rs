//! Inbound replication sessions.
//!
//! One task accepts connections on the replication port for the lifetime
//! of the node. Every accepted connection gets its own task that reads
//! frames, routes each into the inbox or the outgoing store, and acks.

use std::net::SocketAddr;
use std::time::SystemTime;

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use ringcast_core::wire::{self, WireError};
use ringcast_services::{AppendOutcome, SessionPhase, SessionRole};

use super::{read_frame, send_ack, SessionError};
use crate::node::{NodeState, SharedState};

/// Where a received frame ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// New message for this node; `index` is the inbox length after it.
    Inbox { index: u64 },
    /// New message for someone else; a flood round has been requested.
    Outgoing { index: u64 },
    Duplicate,
    Malformed(WireError),
}

/// Tally of one inbound session.
#[derive(Debug, Default)]
pub struct InboundReport {
    pub received: usize,
    pub inbox: usize,
    pub outgoing: usize,
    pub duplicates: usize,
    pub malformed: usize,
}

impl InboundReport {
    fn record(&mut self, outcome: &FrameOutcome) {
        self.received += 1;
        match outcome {
            FrameOutcome::Inbox { .. } => self.inbox += 1,
            FrameOutcome::Outgoing { .. } => self.outgoing += 1,
            FrameOutcome::Duplicate => self.duplicates += 1,
            FrameOutcome::Malformed(_) => self.malformed += 1,
        }
    }
}

pub struct SessionListener {
    listener: TcpListener,
    state: SharedState,
    shutdown: broadcast::Receiver<()>,
}

impl SessionListener {
    pub fn new(listener: TcpListener, state: SharedState, shutdown: broadcast::Receiver<()>) -> Self {
        Self {
            listener,
            state,
            shutdown,
        }
    }

    /// Accept until shutdown. Sessions still running at shutdown are
    /// aborted and awaited before this returns; a frame stored but not yet
    /// acked is simply resent by its peer later.
    pub async fn run(mut self) -> Result<()> {
        tracing::info!(addr = ?self.listener.local_addr().ok(), "waiting for incoming connections");
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!(open = sessions.len(), "session listener shutting down");
                    sessions.shutdown().await;
                    return Ok(());
                }

                Some(_) = sessions.join_next(), if !sessions.is_empty() => {}

                accepted = self.listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    tracing::debug!(%peer_addr, "connection accepted");
                    sessions.spawn(serve_connection(stream, peer_addr, self.state.clone()));
                }
            }
        }
    }
}

/// Run one inbound session to completion, with audit records around it.
pub async fn serve_connection(stream: TcpStream, peer_addr: SocketAddr, state: SharedState) -> InboundReport {
    state
        .audit
        .record_session(SessionRole::Inbound, SessionPhase::Start, peer_addr, SystemTime::now());

    let mut report = InboundReport::default();
    match run_inbound(stream, &state, &mut report).await {
        Ok(()) => tracing::info!(
            %peer_addr,
            received = report.received,
            stored = report.inbox + report.outgoing,
            duplicates = report.duplicates,
            "peer disconnected"
        ),
        Err(e) => tracing::warn!(
            %peer_addr,
            error = %e,
            received = report.received,
            "inbound session aborted"
        ),
    }

    state
        .audit
        .record_session(SessionRole::Inbound, SessionPhase::End, peer_addr, SystemTime::now());
    report
}

/// Receive, store and ack frames until the peer closes the stream.
///
/// A clean close between frames is `Ok`. Malformed frames are dropped but
/// still acked so the sender's lockstep carries on.
pub async fn run_inbound<S>(stream: S, state: &NodeState, report: &mut InboundReport) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    while let Some(frame) = read_frame(&mut reader, state.io_timeout).await? {
        let outcome = store_frame(state, &frame).await;
        report.record(&outcome);
        send_ack(&mut writer, state.io_timeout).await?;
    }
    Ok(())
}

/// Route a frame by its receiver id and append it to the matching store.
pub async fn store_frame(state: &NodeState, frame: &[u8]) -> FrameOutcome {
    let msg = match wire::decode(frame) {
        Ok(m) => m,
        Err(e) => return malformed(frame, e),
    };
    let receiver = msg.receiver();
    tracing::debug!(%msg, "message received");

    if msg.is_for(&state.id) {
        match state.inbox.append(msg.clone()).await {
            AppendOutcome::Appended { logical_len, .. } => {
                tracing::info!(sender = %msg.sender(), index = logical_len, "message for us stored");
                state.audit.record_inbox(logical_len, &msg);
                FrameOutcome::Inbox { index: logical_len }
            }
            AppendOutcome::Duplicate => {
                tracing::debug!(sender = %msg.sender(), "duplicate message for us");
                FrameOutcome::Duplicate
            }
        }
    } else {
        match state.outgoing.append(msg).await {
            AppendOutcome::Appended { logical_len, .. } => {
                tracing::info!(%receiver, index = logical_len, "message for forwarding stored");
                state.flood.trigger();
                FrameOutcome::Outgoing { index: logical_len }
            }
            AppendOutcome::Duplicate => {
                tracing::debug!(%receiver, "duplicate message for forwarding");
                FrameOutcome::Duplicate
            }
        }
    }
}

fn malformed(frame: &[u8], e: WireError) -> FrameOutcome {
    tracing::warn!(error = %e, len = frame.len(), "dropping malformed message");
    FrameOutcome::Malformed(e)
}
