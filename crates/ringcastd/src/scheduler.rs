//! Periodic generation of self-originated messages.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tokio::sync::broadcast;

use ringcast_core::{wire, Message};
use ringcast_services::{AppendOutcome, MessageGenerator};

use crate::node::{NodeState, SharedState};

/// Sleeps a random interval, generates one message, repeats.
pub struct GenerationScheduler {
    state: SharedState,
    generator: Arc<MessageGenerator>,
    min: Duration,
    max: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl GenerationScheduler {
    pub fn new(
        state: SharedState,
        generator: Arc<MessageGenerator>,
        min: Duration,
        max: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            state,
            generator,
            min,
            max: max.max(min),
            shutdown,
        }
    }

    fn next_delay(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }

    pub async fn run(mut self) -> Result<()> {
        tracing::info!(id = %self.generator.local_id(), "generation scheduler started");
        loop {
            let delay = self.next_delay();
            tracing::debug!(?delay, "next message scheduled");

            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("generation scheduler shutting down");
                    return Ok(());
                }

                _ = tokio::time::sleep(delay) => {
                    generate_into(&self.state, &self.generator).await;
                }
            }
        }
    }
}

/// Generate one message, store it in the outgoing ring and request a flood.
///
/// Returns the message if it was stored.
pub async fn generate_into(state: &NodeState, generator: &MessageGenerator) -> Option<Message> {
    let Some(msg) = generator.generate() else {
        tracing::debug!("no peers to address a message to");
        return None;
    };
    if let Err(e) = wire::encode(&msg) {
        tracing::warn!(error = %e, "generated message does not fit a frame");
        return None;
    }

    match state.outgoing.append(msg.clone()).await {
        AppendOutcome::Appended { logical_len, .. } => {
            tracing::info!(receiver = %msg.receiver(), index = logical_len, "message generated");
            state.flood.trigger();
            Some(msg)
        }
        AppendOutcome::Duplicate => {
            // same receiver within the same second
            tracing::debug!(receiver = %msg.receiver(), "generated message already stored");
            None
        }
    }
}
