//! Flood rounds — push every peer the outgoing entries it has not acked.
//!
//! A round starts one outbound session per known peer, runs them
//! concurrently and waits for all of them. Peers that fail are simply
//! retried by the next round; nothing is retried within a round.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinSet;

use crate::node::SharedState;
use crate::session::initiator::replicate_to;

/// Coalescing "flood needed" flag. Any number of triggers before the
/// driver wakes up result in a single round.
#[derive(Clone, Default)]
pub struct FloodTrigger {
    inner: Arc<TriggerInner>,
}

#[derive(Default)]
struct TriggerInner {
    notify: Notify,
    pending: AtomicBool,
}

impl FloodTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.inner.pending.store(true, Ordering::Release);
        self.inner.notify.notify_one();
    }

    /// Wait until a trigger is pending, then consume it.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.inner.pending.swap(false, Ordering::AcqRel) {
                return;
            }
            notified.await;
        }
    }

    pub fn is_pending(&self) -> bool {
        self.inner.pending.load(Ordering::Acquire)
    }

    pub fn clear(&self) {
        self.inner.pending.store(false, Ordering::Release);
    }
}

/// What one round achieved.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RoundSummary {
    pub peers: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Messages acked across all peers.
    pub sent: usize,
}

/// Run one round to completion. A round already in progress on this node
/// finishes first, so each peer has at most one outbound session at a time.
pub async fn run_round(state: &SharedState) -> RoundSummary {
    let _round = state.round.lock().await;
    let mut summary = RoundSummary {
        peers: state.peers.len(),
        ..Default::default()
    };

    let mut sessions = JoinSet::new();
    for &peer in &state.peers {
        let state = state.clone();
        sessions.spawn(async move { (peer, replicate_to(&state, peer).await) });
    }

    while let Some(joined) = sessions.join_next().await {
        match joined {
            Ok((_, Ok(report))) => {
                summary.succeeded += 1;
                summary.sent += report.sent;
            }
            Ok((peer, Err(e))) => {
                summary.failed += 1;
                tracing::warn!(%peer, error = %e, "peer skipped this round");
            }
            Err(e) => {
                summary.failed += 1;
                tracing::error!(error = %e, "outbound session task failed");
            }
        }
    }

    tracing::info!(
        peers = summary.peers,
        succeeded = summary.succeeded,
        failed = summary.failed,
        sent = summary.sent,
        "flood round complete"
    );
    summary
}

/// Waits for triggers and runs rounds, one at a time.
pub struct FloodDriver {
    state: SharedState,
    shutdown: broadcast::Receiver<()>,
}

impl FloodDriver {
    pub fn new(state: SharedState, shutdown: broadcast::Receiver<()>) -> Self {
        Self { state, shutdown }
    }

    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("flood driver shutting down");
                    return Ok(());
                }

                _ = self.state.flood.wait() => {
                    tracing::debug!("flood triggered");
                    run_round(&self.state).await;
                }
            }
        }
    }
}
