//! Node assembly — shared replication state plus the long-lived tasks
//! that drive it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use ringcast_core::config::{GeneratorConfig, RingcastConfig};
use ringcast_core::{Message, NodeId};
use ringcast_services::{AuditLog, MessageGenerator, PeerCursorTable, PeerResolver, RingStore};

use crate::flood::{self, FloodDriver, FloodTrigger, RoundSummary};
use crate::scheduler::{self, GenerationScheduler};
use crate::session::listener::SessionListener;

/// State shared by the listener, every session and the flood driver.
pub struct NodeState {
    pub id: NodeId,
    /// Known peers, never including `id`.
    pub peers: Vec<NodeId>,
    /// Messages for other nodes, eligible for forwarding.
    pub outgoing: RingStore,
    /// Messages addressed to this node.
    pub inbox: RingStore,
    pub cursors: PeerCursorTable,
    pub resolver: Arc<dyn PeerResolver>,
    pub audit: Arc<dyn AuditLog>,
    pub flood: FloodTrigger,
    /// Held for the length of a flood round so rounds never overlap,
    /// whether started by the driver or by `NodeHandle::flood_now`.
    pub(crate) round: Mutex<()>,
    pub connect_timeout: Duration,
    pub io_timeout: Duration,
}

pub type SharedState = Arc<NodeState>;

impl NodeState {
    pub fn new(
        id: NodeId,
        peers: impl IntoIterator<Item = NodeId>,
        capacity: usize,
        resolver: Arc<dyn PeerResolver>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        let mut peers: Vec<NodeId> = peers.into_iter().filter(|p| *p != id).collect();
        peers.sort();
        peers.dedup();

        let cursors = PeerCursorTable::new(peers.iter().copied());
        Self {
            id,
            outgoing: RingStore::with_cursors("outgoing", capacity, cursors.clone()),
            inbox: RingStore::new("inbox", capacity),
            cursors,
            peers,
            resolver,
            audit,
            flood: FloodTrigger::new(),
            round: Mutex::new(()),
            connect_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeouts(mut self, connect: Duration, io: Duration) -> Self {
        self.connect_timeout = connect;
        self.io_timeout = io;
        self
    }

    pub fn from_config(
        config: &RingcastConfig,
        resolver: Arc<dyn PeerResolver>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self::new(
            config.node.id,
            config.peer_ids(),
            config.store.capacity,
            resolver,
            audit,
        )
        .with_timeouts(
            config.session.connect_timeout(),
            config.session.io_timeout(),
        )
    }
}

/// A node that has bound its replication port but not started any task.
pub struct Node {
    state: SharedState,
    listener: TcpListener,
    generator: GeneratorConfig,
}

impl Node {
    /// Bind the configured replication port. Failing to bind is the one
    /// fatal startup error.
    pub async fn bind(
        config: &RingcastConfig,
        resolver: Arc<dyn PeerResolver>,
        audit: Arc<dyn AuditLog>,
    ) -> Result<Self> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind replication port {addr}"))?;
        Ok(Self::with_listener(config, listener, resolver, audit))
    }

    /// Use an already bound listener.
    pub fn with_listener(
        config: &RingcastConfig,
        listener: TcpListener,
        resolver: Arc<dyn PeerResolver>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            state: Arc::new(NodeState::from_config(config, resolver, audit)),
            listener,
            generator: config.generator.clone(),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Start the listener, the flood driver and (if enabled) the
    /// generation scheduler.
    pub fn spawn(self) -> NodeHandle {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let local_addr = self.listener.local_addr().ok();
        let generator = Arc::new(MessageGenerator::new(
            self.state.id,
            self.state.peers.iter().copied(),
            self.generator.payload_for(&self.state.id),
        ));

        tracing::info!(
            id = %self.state.id,
            peers = self.state.peers.len(),
            addr = ?local_addr,
            "node starting"
        );

        let mut tasks = vec![
            tokio::spawn(
                SessionListener::new(self.listener, self.state.clone(), shutdown_tx.subscribe()).run(),
            ),
            tokio::spawn(FloodDriver::new(self.state.clone(), shutdown_tx.subscribe()).run()),
        ];

        if self.generator.enabled {
            let min = Duration::from_secs(self.generator.min_interval_secs);
            let max = Duration::from_secs(self.generator.max_interval_secs);
            tasks.push(tokio::spawn(
                GenerationScheduler::new(
                    self.state.clone(),
                    generator.clone(),
                    min,
                    max,
                    shutdown_tx.subscribe(),
                )
                .run(),
            ));
            tracing::info!(?min, ?max, "message generation enabled");
        }

        NodeHandle {
            state: self.state,
            shutdown_tx,
            tasks,
            local_addr,
            generator,
        }
    }
}

/// Control surface of a running node.
pub struct NodeHandle {
    state: SharedState,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<Result<()>>>,
    local_addr: Option<SocketAddr>,
    generator: Arc<MessageGenerator>,
}

impl NodeHandle {
    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Generate one message now, as the scheduler would on its timer.
    pub async fn generate_now(&self) -> Option<Message> {
        scheduler::generate_into(&self.state, &self.generator).await
    }

    /// Ask the flood driver for a round.
    pub fn trigger_flood(&self) {
        self.state.flood.trigger();
    }

    /// Run one flood round on the caller's task and wait for its summary.
    /// Waits for a round the driver is running to finish first.
    pub async fn flood_now(&self) -> RoundSummary {
        flood::run_round(&self.state).await
    }

    /// Stop every task and wait for them to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        for task in self.tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "node task failed"),
                Err(e) => tracing::warn!(error = %e, "node task panicked"),
            }
        }
        tracing::info!(id = %self.state.id, "node stopped");
    }

    /// Resolves when any task exits on its own.
    pub async fn wait_any(&mut self) -> Option<Result<Result<()>, tokio::task::JoinError>> {
        if self.tasks.is_empty() {
            return None;
        }
        let (result, index, _) = futures::future::select_all(self.tasks.iter_mut()).await;
        self.tasks.remove(index);
        Some(result)
    }
}
