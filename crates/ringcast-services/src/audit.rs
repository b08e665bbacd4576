//! Session audit log.
//!
//! Records when replication sessions start and end, and every message
//! stored in the inbox, as human-readable lines. Recording never blocks a
//! session and never fails it: `FileAuditLog` hands lines to a background
//! writer over a channel and write errors only produce a warning.

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use ringcast_core::Message;

pub const SESSIONS_FILE: &str = "sessions.log";
pub const INBOX_FILE: &str = "inbox.log";

/// Which side of the connection this node is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Accepted connection; we receive and ack.
    Inbound,
    /// Dialled connection; we send and wait for acks.
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Start,
    End,
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        })
    }
}

/// Fire-and-forget audit sink.
pub trait AuditLog: Send + Sync {
    fn record_session(
        &self,
        role: SessionRole,
        phase: SessionPhase,
        peer_addr: SocketAddr,
        at: SystemTime,
    );

    /// `index` is the inbox logical length after the append.
    fn record_inbox(&self, index: u64, msg: &Message);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditLog;

impl AuditLog for NoopAuditLog {
    fn record_session(&self, _: SessionRole, _: SessionPhase, _: SocketAddr, _: SystemTime) {}
    fn record_inbox(&self, _: u64, _: &Message) {}
}

/// Keeps lines in memory. Handy for inspecting what a node recorded.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    sessions: Mutex<Vec<(SessionRole, SessionPhase, SocketAddr)>>,
    inbox: Mutex<Vec<(u64, Message)>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sessions(&self) -> Vec<(SessionRole, SessionPhase, SocketAddr)> {
        self.sessions.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn inbox(&self) -> Vec<(u64, Message)> {
        self.inbox.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl AuditLog for MemoryAuditLog {
    fn record_session(&self, role: SessionRole, phase: SessionPhase, peer_addr: SocketAddr, _: SystemTime) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.push((role, phase, peer_addr));
        }
    }

    fn record_inbox(&self, index: u64, msg: &Message) {
        if let Ok(mut inbox) = self.inbox.lock() {
            inbox.push((index, msg.clone()));
        }
    }
}

enum AuditLine {
    Session(String),
    Inbox(String),
}

/// Appends to `sessions.log` and `inbox.log` in a directory.
pub struct FileAuditLog {
    tx: mpsc::UnboundedSender<AuditLine>,
}

impl FileAuditLog {
    /// Create the directory and start the writer task.
    ///
    /// Must be called from within a tokio runtime. The writer exits once
    /// every handle is dropped.
    pub fn spawn(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(dir, rx));
        Ok(Self { tx })
    }

    fn send(&self, line: AuditLine) {
        if self.tx.send(line).is_err() {
            tracing::warn!("audit writer gone, dropping line");
        }
    }
}

impl AuditLog for FileAuditLog {
    fn record_session(&self, role: SessionRole, phase: SessionPhase, peer_addr: SocketAddr, at: SystemTime) {
        self.send(AuditLine::Session(session_line(role, phase, peer_addr, at)));
    }

    fn record_inbox(&self, index: u64, msg: &Message) {
        self.send(AuditLine::Inbox(format!("message {index}: {msg}\n")));
    }
}

async fn write_loop(dir: PathBuf, mut rx: mpsc::UnboundedReceiver<AuditLine>) {
    let sessions = dir.join(SESSIONS_FILE);
    let inbox = dir.join(INBOX_FILE);

    while let Some(line) = rx.recv().await {
        let (path, text) = match &line {
            AuditLine::Session(text) => (&sessions, text),
            AuditLine::Inbox(text) => (&inbox, text),
        };
        if let Err(e) = append_line(path, text).await {
            tracing::warn!(error = %e, path = %path.display(), "audit write failed");
        }
    }
}

async fn append_line(path: &Path, text: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(text.as_bytes()).await?;
    file.flush().await
}

/// One line per session edge, worded from this node's point of view.
pub fn session_line(role: SessionRole, phase: SessionPhase, peer_addr: SocketAddr, at: SystemTime) -> String {
    let at = format_time(at);
    match (role, phase) {
        (SessionRole::Inbound, SessionPhase::Start) => {
            format!("node {peer_addr} connected at {at}\n")
        }
        (SessionRole::Inbound, SessionPhase::End) => {
            format!("node {peer_addr} disconnected at {at}\n")
        }
        (SessionRole::Outbound, SessionPhase::Start) => {
            format!("connected to node {peer_addr} at {at}\n")
        }
        (SessionRole::Outbound, SessionPhase::End) => {
            format!("disconnected from node {peer_addr} at {at}\n")
        }
    }
}

/// Unix seconds with millisecond precision, e.g. `1580000000.042`.
fn format_time(at: SystemTime) -> String {
    let since = at.duration_since(UNIX_EPOCH).unwrap_or_default();
    format!("{}.{:03}", since.as_secs(), since.subsec_millis())
}
