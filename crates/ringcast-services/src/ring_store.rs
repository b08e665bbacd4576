//! Deduplicating ring store.
//!
//! A fixed-capacity, append-only log of messages. Positions are logical:
//! entry `i` is the i-th message ever appended and lives in physical slot
//! `i % capacity`. Once more than `capacity` messages have been appended
//! the oldest are overwritten, so only the window
//! `[len - live_len, len)` is retained.
//!
//! Appends are rejected when an identical message is still live. When the
//! physical write index wraps back to slot 0 the attached cursor table (if
//! any) is reset so every peer is resynced from the retained window.

use std::sync::Arc;

use tokio::sync::Mutex;

use ringcast_core::Message;

use crate::cursor::PeerCursorTable;

/// Result of an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Stored. `logical_len` counts every append so far, this one included.
    Appended { logical_len: u64, wrapped: bool },
    /// An identical message is already live. Nothing changed.
    Duplicate,
}

impl AppendOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate)
    }
}

/// A consistent window of the store, taken under one lock.
#[derive(Debug, Clone, Default)]
pub struct Slice {
    /// Logical index of `messages[0]`.
    pub start: u64,
    /// Store length when the slice was taken. Entries appended later are
    /// never part of the slice.
    pub end: u64,
    pub messages: Vec<Message>,
}

impl Slice {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }
}

struct Ring {
    slots: Vec<Message>,
    capacity: usize,
    write: usize,
    appended: u64,
}

impl Ring {
    fn contains(&self, msg: &Message) -> bool {
        self.slots.iter().any(|m| m == msg)
    }

    /// Store at the write index. Returns true if the index wrapped.
    fn push(&mut self, msg: Message) -> bool {
        if self.slots.len() < self.capacity {
            self.slots.push(msg);
        } else {
            self.slots[self.write] = msg;
        }
        self.write = (self.write + 1) % self.capacity;
        self.appended += 1;
        self.write == 0
    }

    fn oldest(&self) -> u64 {
        self.appended - self.slots.len() as u64
    }

    fn at(&self, logical: u64) -> &Message {
        &self.slots[(logical % self.capacity as u64) as usize]
    }
}

/// Shared handle to one ring store. Clones share the same buffer.
#[derive(Clone)]
pub struct RingStore {
    name: &'static str,
    ring: Arc<Mutex<Ring>>,
    cursors: Option<PeerCursorTable>,
}

impl RingStore {
    /// A store with no cursor table (the inbox).
    ///
    /// Panics if `capacity` is zero; config validation rejects that earlier.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        assert!(capacity > 0, "ring store capacity must be non-zero");
        Self {
            name,
            ring: Arc::new(Mutex::new(Ring {
                slots: Vec::with_capacity(capacity),
                capacity,
                write: 0,
                appended: 0,
            })),
            cursors: None,
        }
    }

    /// A store whose wrap resets `cursors` (the outgoing store).
    pub fn with_cursors(name: &'static str, capacity: usize, cursors: PeerCursorTable) -> Self {
        Self {
            cursors: Some(cursors),
            ..Self::new(name, capacity)
        }
    }

    /// Append unless an identical message is live.
    pub async fn append(&self, msg: Message) -> AppendOutcome {
        let mut ring = self.ring.lock().await;
        if ring.contains(&msg) {
            return AppendOutcome::Duplicate;
        }

        let wrapped = ring.push(msg);
        if wrapped {
            // Under the store lock, so no append can slip between the wrap
            // and the reset.
            if let Some(cursors) = &self.cursors {
                cursors.reset_all();
            }
            tracing::info!(
                store = self.name,
                capacity = ring.capacity,
                "ring store wrapped, peer cursors reset"
            );
        }

        AppendOutcome::Appended {
            logical_len: ring.appended,
            wrapped,
        }
    }

    /// Every retained entry with logical index `>= offset`, in insertion
    /// order, up to the length at call time.
    ///
    /// Offsets older than the retained window start at the oldest live
    /// entry; offsets past the end yield an empty slice.
    pub async fn slice_from(&self, offset: u64) -> Slice {
        let ring = self.ring.lock().await;
        let end = ring.appended;
        let start = offset.max(ring.oldest()).min(end);
        let messages = (start..end).map(|i| ring.at(i).clone()).collect();
        Slice {
            start,
            end,
            messages,
        }
    }

    /// All retained entries in insertion order.
    pub async fn snapshot(&self) -> Vec<Message> {
        self.slice_from(0).await.messages
    }

    pub async fn contains(&self, msg: &Message) -> bool {
        self.ring.lock().await.contains(msg)
    }

    /// Logical length: total appends so far.
    pub async fn len(&self) -> u64 {
        self.ring.lock().await.appended
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of entries currently retained (at most `capacity`).
    pub async fn live_len(&self) -> usize {
        self.ring.lock().await.slots.len()
    }
}
